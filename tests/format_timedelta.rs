//! Shells out to `/bin/sh` against the embedded `default` runtime's
//! `commands/lib/utils.sh`, exercising `format_timedelta` the same way
//! the runtime's own command scripts source it.

use std::process::Command;

fn format_timedelta(seconds: u64) -> String {
    let script = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/runtime/default/commands/lib/utils.sh"
    );
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(format!(". {script} && format_timedelta {seconds}"))
        .output()
        .expect("/bin/sh is required to run this test");
    assert!(
        output.status.success(),
        "format_timedelta {seconds} exited with {:?}: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout)
        .expect("format_timedelta output was not valid UTF-8")
        .trim_end()
        .to_string()
}

#[test]
fn matches_expected_durations() {
    let cases = [
        (0, "0:00"),
        (4, "0:04"),
        (154, "2:34"),
        (3599, "59:59"),
        (3600, "1:00:00"),
        (5400, "1:30:00"),
        (9762, "2:42:42"),
        (25200, "7:00:00"),
    ];
    for (seconds, expected) in cases {
        assert_eq!(format_timedelta(seconds), expected, "seconds = {seconds}");
    }
}
