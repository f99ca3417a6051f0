//! Shared helpers for integration tests

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Requirements manifest seeded into every test context.
#[allow(dead_code)]
pub const REQUIREMENTS: &str = "flytekit==0.16.0\nwheel==0.36.2\n";

/// Policy file bytes, later checked verbatim against the published layer.
#[allow(dead_code)]
pub const POLICY_BYTES: &[u8] = b"[sandbox]\nallow_network = false\nscratch_dir = /tmp\n";

/// Helper to get the path to the podkiln binary
#[allow(dead_code)]
pub fn podkiln_bin() -> PathBuf {
    // In tests, the binary should be at target/debug/podkiln
    let mut path = env::current_exe()
        .expect("Failed to get current executable path")
        .parent()
        .expect("No parent")
        .parent()
        .expect("No parent")
        .to_path_buf();

    // If we're in deps/, go up one more level
    if path.ends_with("deps") {
        path = path.parent().expect("No parent").to_path_buf();
    }

    path.join("podkiln")
}

/// Create a complete build context: pinned requirements, a build-control
/// makefile, a small code tree, and a policy file.
#[allow(dead_code)]
pub fn seed_context(dir: &Path) {
    fs::write(dir.join("requirements.txt"), REQUIREMENTS).expect("Failed to write requirements");
    fs::write(
        dir.join("in_container.mk"),
        "serialize:\n\tpyflyte serialize workflows\n",
    )
    .expect("Failed to write makefile");
    fs::write(dir.join("sandbox.config"), POLICY_BYTES).expect("Failed to write policy");

    fs::create_dir_all(dir.join("workflows")).expect("Failed to create code tree");
    fs::write(dir.join("workflows/__init__.py"), "").expect("Failed to write __init__.py");
    fs::write(
        dir.join("workflows/hello.py"),
        "def hello():\n    return \"hello\"\n",
    )
    .expect("Failed to write workflow");
}

/// Write a pod spec into the context and return its path.
#[allow(dead_code)]
pub fn write_spec(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("pod.yaml");
    fs::write(&path, yaml).expect("Failed to write spec");
    path
}

/// The spec most end-to-end tests build: a named code tree so the payload
/// lands under a predictable directory.
#[allow(dead_code)]
pub const STANDARD_SPEC: &str = "\
name: demo-pod
base_image: python:3.8-slim-buster
python_version: \"3.8\"
cloud_client: awscli
requirements: requirements.txt
makefile: in_container.mk
code_tree: workflows
policy_file: sandbox.config
";
