use assert_cmd::Command;
use std::path::Path;

pub fn dirsweep_cmd() -> Command {
    Command::cargo_bin("dirsweep").expect("binary built")
}

pub fn scan(directory: &Path, extra_args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = dirsweep_cmd();
    cmd.arg("scan").arg(directory).args(extra_args);
    cmd.assert()
}

pub fn status(directory: &Path) -> assert_cmd::assert::Assert {
    let mut cmd = dirsweep_cmd();
    cmd.arg("status").arg(directory);
    cmd.assert()
}
