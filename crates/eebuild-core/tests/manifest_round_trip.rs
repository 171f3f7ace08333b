//! Manifest write → read → re-serialize must be field-for-field identical.

use eebuild_core::{
    BaseImage, BuildFile, BuildOptions, BuildSteps, CollectionRequirement, ContainerInit,
    Dependencies, Exclusions, GalaxyRequirements, Images, LoadedManifest, Manifest, PipPackage,
    PythonInterpreter, PythonRequirements, RoleRequirement, SystemPackage, SystemRequirements,
};
use std::collections::BTreeMap;

fn full_manifest() -> Manifest {
    let mut build_args = BTreeMap::new();
    build_args.insert(
        "ANSIBLE_GALAXY_CLI_COLLECTION_OPTS".to_string(),
        "--pre".to_string(),
    );

    Manifest {
        version: 3,
        build_arg_defaults: build_args,
        images: Images {
            base_image: BaseImage {
                name: "quay.io/centos/centos:stream9".into(),
                signature_original_name: None,
            },
        },
        dependencies: Dependencies {
            python_interpreter: Some(PythonInterpreter {
                package_system: Some("python3.11".into()),
                python_path: Some("/usr/bin/python3.11".into()),
            }),
            ansible_core: Some(PipPackage {
                package_pip: "ansible-core>=2.15,<2.17".into(),
            }),
            ansible_runner: Some(PipPackage {
                package_pip: "ansible-runner".into(),
            }),
            galaxy: GalaxyRequirements::new(vec![
                CollectionRequirement::named("community.general").with_version(">=8.0.0"),
                CollectionRequirement {
                    name: "acme.internal".into(),
                    version: Some("1.0.0".into()),
                    source: Some("https://galaxy.example.com/api/".into()),
                    kind: Some("galaxy".into()),
                },
            ])
            .with_roles(vec![
                RoleRequirement::named("geerlingguy.java"),
                RoleRequirement {
                    name: None,
                    src: Some("https://github.com/acme/ansible-role-ntp.git".into()),
                    version: Some("v2.1.0".into()),
                    scm: Some("git".into()),
                },
            ]),
            system: SystemRequirements::new(vec![
                SystemPackage::parse("gcc [platform:rpm compile]").unwrap(),
                SystemPackage::parse("krb5-devel >=1.19 [platform:rpm compile]").unwrap(),
                SystemPackage::parse("openssh-clients").unwrap(),
            ]),
            python: PythonRequirements::new(["requests>=2.31", "pywinrm[kerberos]", "jmespath"]),
            exclude: Some(Exclusions {
                python: vec!["docker".into()],
                system: vec![],
                all_from_collections: vec!["community.vmware".into()],
            }),
        },
        options: Some(BuildOptions {
            package_manager_path: Some("/usr/bin/dnf".into()),
            tags: vec!["ee-local:latest".into()],
            user: Some("1000".into()),
            workdir: Some("/runner".into()),
            container_init: Some(ContainerInit {
                package_pip: Some("dumb-init>=1.2.5".into()),
                entrypoint: Some(r#"["dumb-init"]"#.into()),
                cmd: Some(r#"["bash"]"#.into()),
            }),
            skip_ansible_check: None,
            skip_pip_install: None,
            relax_passwd_permissions: Some(false),
        }),
        additional_build_files: vec![BuildFile {
            src: "files/ansible.cfg".into(),
            dest: "configs".into(),
        }],
        additional_build_steps: BuildSteps {
            prepend_base: vec![],
            append_base: vec!["RUN $PYCMD -m pip install -U pip".into()],
            prepend_final: vec![],
            append_final: vec![
                "RUN ansible --version".into(),
                "RUN ansible-galaxy collection list".into(),
            ],
        },
    }
}

#[test]
fn written_manifest_reads_back_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("execution-environment.yml");

    let original = full_manifest();
    original.write(&path).unwrap();

    let loaded = LoadedManifest::load(&path).unwrap();
    assert_eq!(loaded.manifest, original);

    let reserialized = loaded.manifest.to_yaml_string().unwrap();
    assert_eq!(reserialized, std::fs::read_to_string(&path).unwrap());
}

#[test]
fn platform_selectors_survive_round_trip() {
    let text = original_text();
    let first = Manifest::from_yaml_str(&text).unwrap();
    let second = Manifest::from_yaml_str(&first.to_yaml_string().unwrap()).unwrap();

    assert_eq!(first, second);
    let gcc = &second.dependencies.system.packages[0];
    assert_eq!(gcc.name, "gcc");
    assert_eq!(gcc.selectors, vec!["platform:rpm", "compile"]);
}

#[test]
fn inline_galaxy_mapping_normalises_to_same_model() {
    let embedded = Manifest::from_yaml_str(&original_text()).unwrap();
    let inline_text = original_text().replace(
        "  galaxy: |\n    collections:\n      - name: community.general\n        version: \">=8.0.0\"\n",
        "  galaxy:\n    collections:\n      - name: community.general\n        version: \">=8.0.0\"\n",
    );
    let inline = Manifest::from_yaml_str(&inline_text).unwrap();
    assert_eq!(embedded, inline);
}

#[test]
fn minimal_manifest_omits_empty_sections() {
    let text = "version: 3\nimages:\n  base_image:\n    name: registry.example.com/base:1\ndependencies:\n  ansible_core:\n    package_pip: ansible-core\n";
    let manifest = Manifest::from_yaml_str(text).unwrap();
    let out = manifest.to_yaml_string().unwrap();
    assert!(!out.contains("additional_build_steps"));
    assert!(!out.contains("galaxy"));
    assert_eq!(Manifest::from_yaml_str(&out).unwrap(), manifest);
}

#[test]
fn builder_keys_outside_the_core_model_round_trip() {
    let text = original_text()
        .replace(
            "      - name: community.general\n        version: \">=8.0.0\"\n",
            "      - community.general\n      - name: ansible.utils\n    roles:\n      - geerlingguy.java\n",
        )
        + concat!(
            "additional_build_files:\n",
            "  - src: files/ansible.cfg\n",
            "    dest: configs\n",
            "options:\n",
            "  user: \"1000\"\n",
            "  container_init:\n",
            "    package_pip: dumb-init>=1.2.5\n",
            "    entrypoint: '[\"dumb-init\"]'\n",
        );
    let first = Manifest::from_yaml_str(&text).unwrap();
    assert_eq!(
        first.collection_names(),
        vec!["community.general", "ansible.utils"]
    );
    assert_eq!(
        first.dependencies.galaxy.roles,
        vec![RoleRequirement::named("geerlingguy.java")]
    );
    assert_eq!(first.additional_build_files.len(), 1);

    let out = first.to_yaml_string().unwrap();
    let second = Manifest::from_yaml_str(&out).unwrap();
    assert_eq!(second, first);
    assert_eq!(second.to_yaml_string().unwrap(), out);
}

#[test]
fn misspelt_top_level_key_is_still_rejected() {
    let text = original_text() + "additional_build_flies: []\n";
    assert!(Manifest::from_yaml_str(&text).is_err());
}

fn original_text() -> String {
    [
        "version: 3",
        "images:",
        "  base_image:",
        "    name: quay.io/centos/centos:stream9",
        "dependencies:",
        "  ansible_core:",
        "    package_pip: ansible-core",
        "  galaxy: |",
        "    collections:",
        "      - name: community.general",
        "        version: \">=8.0.0\"",
        "  system: |",
        "    gcc [platform:rpm compile]",
        "    libffi-devel [platform:rpm]",
        "",
    ]
    .join("\n")
}
