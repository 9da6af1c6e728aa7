//! Fake engines for tests that run the solve pipeline.

use std::sync::Mutex;

/// Serializes tests that write and exec scripts, so a script is never
/// executed while another test still holds it open for writing.
pub static ENGINE_LOCK: Mutex<()> = Mutex::new(());

/// Write an executable `/bin/sh` script named `festival` into `dir`.
#[cfg(unix)]
pub fn fake_engine(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("festival");
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write fake engine");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake engine");
    path
}

/// Shell lines printing `frames` progress frames of `####/#@ #/####`.
pub fn frame_script(frames: u32) -> String {
    const WALL: &str = "\\033[36;46m ";
    const PLAYER: &str = "\\033[34;107m.";
    const FLOOR: &str = "\\033[97;107m ";

    (1..=frames)
        .map(|frame| {
            format!(
                "printf '  {frame}\\n0 {w}{w}{w}{w}\\n1 {w}{p}{s}{w}\\n2 {w}{w}{w}{w}\\nsearching\\n'\n",
                w = WALL,
                p = PLAYER,
                s = FLOOR
            )
        })
        .collect()
}
