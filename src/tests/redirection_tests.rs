use std::env;
use std::fs;

use super::{fork_shell, serial, sh, test_config};
use crate::shell::ast::{InputRedirect, Node, OutputRedirect, Setup, Simple, Subshell};

fn path_of(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

#[test]
fn test_here_doc_feeds_stdin() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let (mut shell, _, _) = fork_shell(test_config());

    for text in ["", "one line\n", "first\nsecond\nthird\n"] {
        let out = path_of(&dir, "here");
        let node = Node::Simple(
            Simple::new(["cat"])
                .stdin(InputRedirect::HereDoc(text.to_string()))
                .stdout(OutputRedirect::Truncate(out.clone())),
        );
        assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), text);
    }
}

#[test]
fn test_input_file_and_append() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let input = path_of(&dir, "in.txt");
    let output = path_of(&dir, "out.txt");
    fs::write(&input, "abc\n").unwrap();
    fs::write(&output, "first\n").unwrap();
    let (mut shell, _, _) = fork_shell(test_config());

    let node = Node::Simple(
        Simple::new(["cat"])
            .stdin(InputRedirect::File(input))
            .stdout(OutputRedirect::Append(output.clone())),
    );
    assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
    assert_eq!(fs::read_to_string(&output).unwrap(), "first\nabc\n");
}

#[test]
fn test_missing_input_fails_only_the_command() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let marker = path_of(&dir, "marker");
    let (mut shell, _, _) = fork_shell(test_config());

    let broken = Node::Simple(
        Simple::new(["cat"]).stdin(InputRedirect::File(path_of(&dir, "missing"))),
    );
    let node = Node::sequence(broken, Some(Node::simple(["touch", marker.as_str()])));
    assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
    assert!(fs::metadata(&marker).is_ok());

    let broken = Node::Simple(
        Simple::new(["cat"]).stdin(InputRedirect::File(path_of(&dir, "missing"))),
    );
    assert_ne!(shell.execute(Some(&broken)).unwrap(), 0);
}

#[test]
fn test_locals_visible_to_child_only() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let out = path_of(&dir, "env");
    let (mut shell, _, _) = fork_shell(test_config());

    let node = Node::Simple(
        Simple::new(["sh", "-c", "printf %s \"$ZAKOSH_EXEC_GREETING\""])
            .local("ZAKOSH_EXEC_GREETING", "hi there")
            .stdout(OutputRedirect::Truncate(out.clone())),
    );
    assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "hi there");
    assert!(env::var("ZAKOSH_EXEC_GREETING").is_err());
}

#[test]
fn test_status_variable_cannot_be_overridden() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let out = path_of(&dir, "env");
    let (mut shell, _, _) = fork_shell(test_config());

    shell.execute(Some(&sh("exit 3"))).unwrap();
    let node = Node::Simple(
        Simple::new(["env"])
            .local("?", "9")
            .stdout(OutputRedirect::Truncate(out.clone())),
    );
    assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
    let listing = fs::read_to_string(&out).unwrap();
    assert!(listing.lines().any(|line| line == "?=3"));
    assert!(!listing.lines().any(|line| line == "?=9"));
}

#[test]
fn test_subshell_redirection_covers_inner_tree() {
    let _lock = serial();
    let dir = tempfile::tempdir().unwrap();
    let out = path_of(&dir, "out");
    let (mut shell, _, _) = fork_shell(test_config());

    let node = Node::Subshell(Subshell {
        inner: Box::new(Node::sequence(
            Node::simple(["echo", "a"]),
            Some(Node::simple(["echo", "b"])),
        )),
        setup: Setup {
            output: OutputRedirect::Truncate(out.clone()),
            ..Setup::default()
        },
    });
    assert_eq!(shell.execute(Some(&node)).unwrap(), 0);
    assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");
}
