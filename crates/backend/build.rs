use std::env;
use std::fs;
use std::path::Path;

// Copies the workspace config.toml next to the produced binary so that the
// exe-adjacent lookup in shared::config finds it.
fn main() {
    println!("cargo:rerun-if-changed=../../config.toml");

    let out_dir = env::var("OUT_DIR").unwrap();
    let profile = env::var("PROFILE").unwrap(); // "debug" or "release"

    // OUT_DIR is typically target/<profile>/build/backend-xxx/out;
    // walk up to target/<profile>
    let out_path = Path::new(&out_dir);
    let target_dir = out_path
        .ancestors()
        .find(|p| p.ends_with(&profile))
        .expect("Could not find target profile directory");

    let workspace_root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("Could not find workspace root");

    let source_config = workspace_root.join("config.toml");
    let dest_config = target_dir.join("config.toml");

    if source_config.exists() {
        fs::copy(&source_config, &dest_config)
            .unwrap_or_else(|e| panic!("Failed to copy config.toml: {}", e));
    } else {
        println!(
            "cargo:warning=config.toml not found at {:?}, using default config",
            source_config
        );
    }
}
