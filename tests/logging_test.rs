use cbs_bronze::logging::init_logging;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_init_logging_leaves_no_file_when_subscriber_exists() {
    tracing::subscriber::set_global_default(tracing_subscriber::registry()).unwrap();

    let tmp = tempdir().unwrap();
    let log_dir = tmp.path().join("logs");
    let handle = init_logging(&log_dir).unwrap();

    assert!(handle.is_none());
    let leftovers = fs::read_dir(&log_dir).map(|entries| entries.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}
