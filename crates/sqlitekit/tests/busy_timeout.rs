//! Lock-contention behavior across two connections to the same file.

use sqlitekit::{Database, ffi};
use std::time::{Duration, Instant};

fn temp_db_path(name: &str) -> String {
    std::env::temp_dir()
        .join(format!("sqlitekit_{}_{}.db", name, std::process::id()))
        .to_string_lossy()
        .into_owned()
}

#[test]
fn conflicting_write_blocks_then_fails_busy() {
    let path = temp_db_path("busy");
    let _ = std::fs::remove_file(&path);

    let writer = Database::open(&path).expect("open writer");
    writer
        .exec_dml("CREATE TABLE t(id INTEGER)")
        .expect("create table");

    let mut contender = Database::open(&path).expect("open contender");
    contender.set_busy_timeout(250).expect("set timeout");

    // Hold the write lock on the first connection.
    writer.exec_dml("BEGIN IMMEDIATE").expect("acquire lock");
    writer
        .exec_dml("INSERT INTO t VALUES (1)")
        .expect("write inside tx");

    // The second connection must wait out the busy timeout, not fail at
    // once.
    let start = Instant::now();
    let err = contender
        .exec_dml("INSERT INTO t VALUES (2)")
        .expect_err("conflicting write fails");
    let waited = start.elapsed();

    assert_eq!(err.code(), ffi::SQLITE_BUSY);
    assert!(
        waited >= Duration::from_millis(150),
        "failed after only {waited:?}, expected a blocking wait"
    );

    // Releasing the lock lets the contender through.
    writer.exec_dml("COMMIT").expect("commit");
    contender
        .exec_dml("INSERT INTO t VALUES (2)")
        .expect("write after release");
    assert_eq!(
        contender.exec_scalar("SELECT count(*) FROM t", 0).expect("count"),
        2
    );

    drop(contender);
    drop(writer);
    let _ = std::fs::remove_file(&path);
}
