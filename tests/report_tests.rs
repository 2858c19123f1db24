use std::fs;
use std::time::Duration;

use md5_tunnel::report::{
    format_summary, message_paths, summary_path, write_messages, write_outputs, write_summary,
    OutputOptions,
};
use md5_tunnel::search::{SearchReport, SearchStats, StageReport};
use md5_tunnel::WANG_COLLISION_0;
use tempfile::TempDir;

fn wang_report() -> SearchReport {
    let stage = StageReport {
        elapsed: Duration::from_millis(1500),
        stats: SearchStats::default(),
    };
    SearchReport {
        collision: WANG_COLLISION_0.to_collision(),
        block1: stage,
        block2: StageReport {
            elapsed: Duration::from_micros(250),
            ..stage
        },
    }
}

#[test]
fn test_summary_layout() {
    let text = format_summary(&wang_report());
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "");
    assert_eq!(lines[1], "unsigned char m0[128] = {");
    assert!(lines[2].starts_with("0xD1,0x31,0xDD,0x02,"));
    assert_eq!(lines[10], "};");
    assert_eq!(lines[12], "unsigned char m1[128] = {");
    assert!(text.contains("/* First collision block took  : 1.500000 sec */"));
    assert!(text.contains("/* Second collision block took : 0.000250 sec */"));
    assert!(text.ends_with("/* Colliding hash: a4c0d35c95a63a805915367dcfe6b751 */\n"));
}

#[test]
fn test_write_summary_appends() {
    let dir = TempDir::new().unwrap();
    let report = wang_report();

    let path = write_summary(dir.path(), &report).unwrap();
    assert_eq!(path, summary_path(dir.path(), 0));
    let once = fs::read_to_string(&path).unwrap();

    write_summary(dir.path(), &report).unwrap();
    let twice = fs::read_to_string(&path).unwrap();
    assert_eq!(twice, format!("{}{}", once, once));
}

#[test]
fn test_write_messages() {
    let dir = TempDir::new().unwrap();
    let collision = WANG_COLLISION_0.to_collision();

    let (first, second) = write_messages(dir.path(), &collision).unwrap();
    assert_eq!((first.clone(), second.clone()), message_paths(dir.path(), 0));
    assert!(first.ends_with("collision1_md5_00000000.bin"));
    assert!(second.ends_with("collision2_md5_00000000.bin"));

    let first_bytes = fs::read(&first).unwrap();
    let second_bytes = fs::read(&second).unwrap();
    assert_eq!(first_bytes.len(), 128);
    assert_eq!(first_bytes, collision.message_1);
    assert_eq!(second_bytes, collision.message_2);
    assert_ne!(first_bytes, second_bytes);
    assert_eq!(
        reference_md5::compute(&first_bytes),
        reference_md5::compute(&second_bytes)
    );
}

#[test]
fn test_write_into_missing_directory_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let collision = WANG_COLLISION_0.to_collision();

    assert!(matches!(
        write_messages(&missing, &collision),
        Err(md5_tunnel::CollisionError::Io(_))
    ));
}

#[test]
fn test_write_outputs_reports_each_file() {
    let dir = TempDir::new().unwrap();
    let report = wang_report();
    let options = OutputOptions {
        summary: true,
        messages: true,
    };

    let outcomes = write_outputs(dir.path(), &report, options);
    let labels: Vec<&str> = outcomes.iter().map(|outcome| outcome.label).collect();
    assert_eq!(labels, ["Summary", "Message 1", "Message 2"]);
    assert!(outcomes.iter().all(|outcome| outcome.is_ok()));
    assert!(outcomes.iter().all(|outcome| outcome.status() == "OK"));

    assert_eq!(fs::read(&outcomes[2].path).unwrap(), report.collision.message_2);
}

#[test]
fn test_write_outputs_keeps_going_after_failure() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing");
    let report = wang_report();
    let options = OutputOptions {
        summary: true,
        messages: true,
    };

    let outcomes = write_outputs(&missing, &report, options);
    assert_eq!(outcomes.len(), 3);
    for outcome in &outcomes {
        assert!(!outcome.is_ok(), "{} should fail", outcome.label);
        assert!(outcome.status().starts_with("FAILED ("));
        assert!(matches!(
            outcome.result,
            Err(md5_tunnel::CollisionError::Io(_))
        ));
    }

    // The collision itself is untouched by the failed writes
    assert!(report.collision.verify());
    assert_eq!(
        report.collision.digest_hex(),
        "a4c0d35c95a63a805915367dcfe6b751"
    );
}

#[test]
fn test_write_outputs_honours_options() {
    let dir = TempDir::new().unwrap();
    let report = wang_report();

    let only_messages = write_outputs(
        dir.path(),
        &report,
        OutputOptions {
            summary: false,
            messages: true,
        },
    );
    assert_eq!(only_messages.len(), 2);
    assert!(!summary_path(dir.path(), 0).exists());

    let nothing = write_outputs(
        dir.path(),
        &report,
        OutputOptions {
            summary: false,
            messages: false,
        },
    );
    assert!(nothing.is_empty());
}
