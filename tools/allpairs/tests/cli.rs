use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const SMALL_GRAPH: &str = "1,4,2,9\n2,1\n2,0\n";

fn allpairs() -> Command {
    Command::cargo_bin("allpairs").unwrap()
}

fn write_small_graph(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("graph.txt");
    fs::write(&path, SMALL_GRAPH).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    allpairs()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("parallel"))
        .stdout(predicate::str::contains("distributed"));
}

#[test]
fn serial_prints_matrix_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_small_graph(dir.path());

    allpairs()
        .arg("serial")
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 |\t0\t4\t5"))
        .stdout(predicate::str::contains("2 |\tN/A\tN/A\t0"))
        .stdout(predicate::str::contains("Strategy: serial"))
        .stdout(predicate::str::contains("Unreachable pairs: 3"));
}

#[test]
fn parallel_prints_per_thread_rows() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_small_graph(dir.path());

    allpairs()
        .args(["parallel", "--threads", "2"])
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 |\t0\t4\t5"))
        .stdout(predicate::str::contains("Thread"))
        .stdout(predicate::str::contains("0..1"))
        .stdout(predicate::str::contains("1..3"));
}

#[test]
fn local_distributed_matches_serial() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_small_graph(dir.path());

    allpairs()
        .args(["distributed", "--local", "--world-size", "3", "--rounds", "per-rank"])
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 |\t0\t4\t5"))
        .stdout(predicate::str::contains("Rounds: 3"));
}

#[test]
fn config_file_supplies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let graph = write_small_graph(dir.path());
    let config = dir.path().join("allpairs.toml");
    fs::write(&config, "threads = 3\n").unwrap();

    allpairs()
        .args(["parallel", "--no-matrix", "--config"])
        .arg(&config)
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("2..3"))
        .stdout(predicate::str::contains("N/A").not());
}

#[test]
fn generated_graph_solves() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("random.txt");

    allpairs()
        .args(["generate", "--nodes", "20", "--edges", "3", "--seed", "42"])
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 20 nodes"));
    assert_eq!(fs::read_to_string(&graph).unwrap().lines().count(), 20);

    allpairs()
        .args(["parallel", "--threads", "4", "--no-matrix"])
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("Vertices: 20"))
        .stdout(predicate::str::contains("Edges: 60"));
}

#[test]
fn malformed_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let graph = dir.path().join("bad.txt");
    fs::write(&graph, "1,4,2\n0,1\n").unwrap();

    allpairs()
        .arg("serial")
        .arg(&graph)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed adjacency line for vertex 0"));
}

#[test]
fn missing_input_fails() {
    allpairs()
        .args(["serial", "does-not-exist.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read graph"));
}

#[test]
fn rank_without_coordinator_is_rejected() {
    allpairs()
        .args(["distributed", "--rank", "1", "graph.txt"])
        .assert()
        .failure();
}
