use std::collections::BTreeSet;
use std::path::PathBuf;

use proptest::prelude::*;

use spine_items::item::OutputStream;
use spine_items::output_log::{strip_ansi_escape_codes, OutputLogWriter};
use spine_items::tool::archive::filter_subdir;
use spine_items::watch::{diff_snapshots, DirectorySnapshot, FileEvent};

fn file_names() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z]{1,8}\\.(csv|txt|dat)", 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn log_parts_cover_output_exactly(
        line_len in 1usize..20,
        lines_per_file in 1u64..6,
        line_count in 1usize..40,
    ) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cap = lines_per_file * (line_len as u64 + 1);
        let mut writer = OutputLogWriter::with_max_size(tmp.path(), "Tool", cap);
        let line = "x".repeat(line_len);
        for _ in 0..line_count {
            writer.write("", OutputStream::Stdout, &line).expect("write");
        }

        let total = line_count as u64 * (line_len as u64 + 1);
        let expected = total.div_ceil(cap) as usize;
        let files = writer.log_files("");
        prop_assert_eq!(files.len(), expected);

        let body_lines: usize = files
            .iter()
            .map(|f| {
                std::fs::read_to_string(f)
                    .expect("read")
                    .lines()
                    .filter(|l| !l.starts_with("### "))
                    .count()
            })
            .sum();
        prop_assert_eq!(body_lines, line_count);
    }

    #[test]
    fn stripping_ansi_is_idempotent(
        parts in prop::collection::vec(
            prop_oneof![
                "[ -~]{0,6}",
                Just("\x1b[0m".to_string()),
                Just("\x1b[1;31m".to_string()),
                Just("\x1b".to_string()),
                Just("[".to_string()),
            ],
            0..12,
        )
    ) {
        let text: String = parts.concat();
        let once = strip_ansi_escape_codes(&text);
        prop_assert_eq!(strip_ansi_escape_codes(&once), once.clone());
        prop_assert!(!once.contains("\x1b[0m"));
    }

    #[test]
    fn single_rename_is_one_event(
        names in file_names(),
        new_name in "[A-Z]{1,8}\\.bin",
        pick in any::<prop::sample::Index>(),
    ) {
        let dir = PathBuf::from("/watched");
        let files: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();
        let old = files[pick.index(files.len())].clone();
        let new = dir.join(&new_name);

        let before = DirectorySnapshot::from_files(&dir, files.clone());
        let after = DirectorySnapshot::from_files(
            &dir,
            files.iter().filter(|p| **p != old).cloned().chain([new.clone()]),
        );
        prop_assert_eq!(diff_snapshots(&before, &after), vec![FileEvent::Renamed { old, new }]);
    }

    #[test]
    fn filter_subdirs_are_hex_and_distinct(a in ".{0,16}", b in ".{0,16}") {
        let (da, db) = (filter_subdir(&a), filter_subdir(&b));
        prop_assert_eq!(da.len(), 40);
        prop_assert!(da.chars().all(|c| c.is_ascii_hexdigit()));
        prop_assert_eq!(a == b, da == db);
    }
}
