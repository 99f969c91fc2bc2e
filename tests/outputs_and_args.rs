mod common;
use crate::common::builders::{labelled_file, upstream_database};
use crate::common::RecordingSink;

use std::path::Path;

use spine_items::item::{MessageKind, OutputStream};
use spine_items::output_log::{strip_ansi_escape_codes, OutputLogWriter};
use spine_items::resource::{file_resource_in_pack, transient_file_resource, url_resource};
use spine_items::spec::CmdLineArg;
use spine_items::tool::archive::{
    archive_output_files, filter_output_dir, filter_subdir, find_last_output_dir,
    find_last_output_files, is_timestamp_dir_name, result_dir, timestamp_now,
};
use spine_items::tool::args::{
    expand_cmd_line_args, labelled_resource_args, update_missing_flags, ResourceStack,
};

fn touch(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("parent dir");
    }
    std::fs::write(path, contents).expect("write");
}

#[test]
fn archive_copies_literals_and_pattern_hits() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let exec_dir = tmp.path().join("exec");
    touch(&exec_dir.join("out.dat"), b"1");
    touch(&exec_dir.join("results/a.csv"), b"a");
    touch(&exec_dir.join("results/b.csv"), b"b");
    touch(&exec_dir.join("results/skip.txt"), b"-");

    let target = result_dir(&tmp.path().join("output"), true, "2024-01-02T03.04.05");
    let report = archive_output_files(["out.dat", "results/*.csv", "never.dat"], &exec_dir, &target)
        .expect("archive");

    assert_eq!(report.result_dir, target);
    assert_eq!(report.failed_files, vec!["never.dat".to_string()]);
    assert_eq!(report.archived.len(), 3);
    assert!(target.join("results/a.csv").is_file());
    assert!(target.join("results/b.csv").is_file());
    assert!(!target.join("results/skip.txt").exists());
}

#[test]
fn double_star_crosses_directories_and_single_star_does_not() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let exec_dir = tmp.path().join("exec");
    touch(&exec_dir.join("data/top.csv"), b"0");
    touch(&exec_dir.join("data/a/one.csv"), b"1");
    touch(&exec_dir.join("data/a/b/two.csv"), b"2");
    touch(&exec_dir.join("data/a/b/notes.txt"), b"-");
    touch(&exec_dir.join("flat/x.csv"), b"x");
    touch(&exec_dir.join("flat/nested/y.csv"), b"y");

    let target = result_dir(&tmp.path().join("output"), true, "2024-01-02T03.04.05");
    let report = archive_output_files(["data/**/*.csv", "flat/*.csv"], &exec_dir, &target)
        .expect("archive");

    assert!(report.failed_files.is_empty());
    assert_eq!(report.archived.len(), 4);
    assert!(target.join("data/top.csv").is_file());
    assert!(target.join("data/a/one.csv").is_file());
    assert!(target.join("data/a/b/two.csv").is_file());
    assert!(!target.join("data/a/b/notes.txt").exists());
    assert!(target.join("flat/x.csv").is_file());
    assert!(!target.join("flat/nested/y.csv").exists());
}

#[test]
fn failed_runs_are_archived_separately_and_skipped_when_searching() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let output = tmp.path().join("output");
    assert_eq!(
        result_dir(&output, false, "2024-01-02T03.04.05"),
        output.join("failed").join("2024-01-02T03.04.05")
    );

    touch(&output.join("2024-01-01T00.00.00/out.dat"), b"old");
    touch(&output.join("2024-03-01T00.00.00/out.dat"), b"new");
    touch(&output.join("failed/2025-01-01T00.00.00/out.dat"), b"bad");
    touch(&output.join("not-a-timestamp/out.dat"), b"?");

    assert_eq!(
        find_last_output_dir(&output),
        Some(output.join("2024-03-01T00.00.00"))
    );
    let found = find_last_output_files(["out.dat", "*.csv"], &output);
    assert_eq!(found["out.dat"], vec![output.join("2024-03-01T00.00.00/out.dat")]);
    assert!(found["*.csv"].is_empty());
}

#[test]
fn filter_directories_are_stable_digests() {
    let subdir = filter_subdir("scenario: base");
    assert_eq!(subdir.len(), 40);
    assert!(subdir.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(subdir, filter_subdir("scenario: base"));
    assert_ne!(subdir, filter_subdir("scenario: other"));

    let root = Path::new("/out");
    assert_eq!(filter_output_dir(root, ""), root);
    assert_eq!(filter_output_dir(root, "scenario: base"), root.join(subdir));

    // Filtered archives are found one level down.
    let tmp = tempfile::tempdir().expect("tempdir");
    touch(
        &filter_output_dir(tmp.path(), "f").join("2024-05-05T05.05.05/x.txt"),
        b"x",
    );
    assert!(find_last_output_dir(tmp.path()).is_some());
}

#[test]
fn timestamps_use_the_archive_format() {
    assert!(is_timestamp_dir_name(&timestamp_now()));
    assert!(is_timestamp_dir_name("2024-01-02T03.04.05"));
    assert!(!is_timestamp_dir_name("2024-01-02 03:04:05"));
    assert!(!is_timestamp_dir_name("failed"));
}

#[test]
fn labels_expand_to_resource_values() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let a = tmp.path().join("a.csv");
    let b = tmp.path().join("b.csv");
    let db = tmp.path().join("db.sqlite");
    touch(&db, b"");
    let db_url = format!("sqlite:///{}", db.display());

    let resources = vec![
        labelled_file(&a, "input"),
        file_resource_in_pack("upstream", "*.csv", Some(a.as_path())),
        file_resource_in_pack("upstream", "*.csv", Some(b.as_path())),
        url_resource("upstream", "https://example.com/data", "remote"),
        transient_file_resource("upstream", "later.csv"),
        upstream_database(&db_url),
    ];
    let mut stack = ResourceStack::new();
    let table = labelled_resource_args(&resources, &mut stack).expect("table");
    assert_eq!(stack.len(), 1);

    let sink = RecordingSink::new();
    let logger = sink.logger("Tool");
    let args = vec![
        CmdLineArg::literal("--in"),
        CmdLineArg::label("input"),
        CmdLineArg::label("*.csv"),
        CmdLineArg::label("remote"),
        CmdLineArg::label("later.csv"),
        CmdLineArg::label(db_url.clone()),
    ];
    let expanded = expand_cmd_line_args(&args, &table, &logger);
    assert_eq!(
        expanded,
        vec![
            "--in".to_string(),
            a.to_string_lossy().into_owned(),
            a.to_string_lossy().into_owned(),
            b.to_string_lossy().into_owned(),
            "https://example.com/data".to_string(),
            "later.csv".to_string(),
            db_url,
        ]
    );
    let warnings = sink.messages(MessageKind::Warning);
    assert_eq!(warnings, vec!["No resources matching argument later.csv".to_string()]);

    stack.release_all(&logger);
    assert!(stack.is_empty());
    assert_eq!(sink.messages(MessageKind::Warning).len(), 1);
}

#[test]
fn missing_sqlite_file_cannot_be_checked_out() {
    let mut stack = ResourceStack::new();
    let resources = vec![upstream_database("sqlite:////nowhere/at/all.sqlite")];
    assert!(labelled_resource_args(&resources, &mut stack).is_err());
    assert!(stack.is_empty());
}

#[test]
fn database_removed_during_run_is_reported_on_release() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db = tmp.path().join("db.sqlite");
    touch(&db, b"");
    let mut stack = ResourceStack::new();
    labelled_resource_args(&[upstream_database(&format!("sqlite:///{}", db.display()))], &mut stack)
        .expect("table");

    std::fs::remove_file(&db).expect("remove");
    let sink = RecordingSink::new();
    stack.release_all(&sink.logger("Tool"));
    let warnings = sink.messages(MessageKind::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("disappeared"), "{warnings:?}");
}

#[test]
fn missing_flags_follow_available_labels() {
    let mut args = vec![
        CmdLineArg::literal("-v"),
        CmdLineArg::label("input"),
        CmdLineArg::label("gone"),
    ];
    update_missing_flags(&mut args, &[labelled_file(Path::new("/data/a.csv"), "input")]);
    assert_eq!(
        args,
        vec![
            CmdLineArg::literal("-v"),
            CmdLineArg::Label {
                label: "input".to_string(),
                missing: false
            },
            CmdLineArg::Label {
                label: "gone".to_string(),
                missing: true
            },
        ]
    );
}

#[test]
fn log_files_start_with_a_header_and_roll_over() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let logs = tmp.path().join("logs");
    let mut writer = OutputLogWriter::with_max_size(&logs, "Tool", 5);

    writer
        .write("", OutputStream::Stdout, "\x1b[31mred\x1b[0m line\n\nsecond")
        .expect("write");
    writer.write("f1", OutputStream::Stderr, "other").expect("write");

    let files = writer.log_files("").to_vec();
    assert_eq!(files.len(), 2);
    let first = std::fs::read_to_string(&files[0]).expect("read");
    let lines: Vec<&str> = first.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        format!(
            "### Filename: {}",
            files[0].file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
        )
    );
    assert_eq!(lines[1], "### Item name: Tool");
    assert_eq!(lines[2], "### Filter id: ");
    assert_eq!(lines[3], "### Part: 1");
    assert_eq!(lines[4], "red line");

    let second = std::fs::read_to_string(&files[1]).expect("read");
    assert!(second.contains("### Part: 2"));
    assert!(second.ends_with("second\n"));

    let filtered = writer.log_files("f1");
    assert_eq!(filtered.len(), 1);
    let text = std::fs::read_to_string(&filtered[0]).expect("read");
    assert!(text.contains("### Filter id: f1"));
    assert!(text.contains("### Part: 3"));
    assert_eq!(writer.current_path("f1"), Some(filtered[0].as_path()));
}

#[test]
fn ansi_sequences_are_removed() {
    assert_eq!(strip_ansi_escape_codes("\x1b[1;32mok\x1b[0m"), "ok");
    assert_eq!(strip_ansi_escape_codes("plain"), "plain");
    assert_eq!(strip_ansi_escape_codes("\x1b\x1b[0m[0mx"), "x");
}
