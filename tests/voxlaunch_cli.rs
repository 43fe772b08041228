//! Integration tests that lock voxlaunch CLI flag and output behavior.

use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn voxlaunch_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_voxlaunch").expect("voxlaunch test binary not built")
}

#[test]
fn help_mentions_name_and_core_flags() {
    let output = Command::new(voxlaunch_bin())
        .arg("--help")
        .output()
        .expect("run voxlaunch --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("voxlaunch"));
    assert!(combined.contains("--model"));
    assert!(combined.contains("--input-device"));
    assert!(combined.contains("--catalog"));
    assert!(combined.contains("--list-microphones"));
}

#[test]
fn list_microphones_prints_devices_or_empty_notice() {
    let output = Command::new(voxlaunch_bin())
        .arg("--list-microphones")
        .output()
        .expect("run voxlaunch --list-microphones");
    assert!(output.status.success());
}

#[test]
fn missing_model_flag_is_reported() {
    let output = Command::new(voxlaunch_bin())
        .output()
        .expect("run voxlaunch without flags");
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("--model"));
}

#[test]
fn no_voice_flag_exits_cleanly_without_a_model_check() {
    let output = Command::new(voxlaunch_bin())
        .args(["--model", "/definitely/not/a/model/dir", "--no-voice"])
        .output()
        .expect("run voxlaunch --no-voice");
    assert!(output.status.success());
    assert!(combined_output(&output).contains("voice triggers disabled"));
}
