use std::fs;
use std::path::Path;
use std::sync::Arc;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use shipyard_core::Error;
use shipyard_core::stamp::StampResolver;
use shipyard_core::vcs::{GitRepository, Vcs};
use tempfile::TempDir;

fn commit_file(repo: &Repository, name: &str, body: &str, message: &str) -> Oid {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), body).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Shipyard Test", "test@example.com").unwrap();
    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

fn fixture() -> (TempDir, Repository, Oid, Oid) {
    let temp = TempDir::new().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(temp.path(), &opts).unwrap();
    let first = commit_file(&repo, "manage.py", "v1\n", "first");
    let second = commit_file(&repo, "manage.py", "v2\n", "second");
    (temp, repo, first, second)
}

#[test]
fn resolves_head_branch_and_short_revision() {
    let (temp, repo, first, second) = fixture();
    repo.branch("release", &repo.find_commit(first).unwrap(), false)
        .unwrap();
    let git = GitRepository::new(temp.path());

    assert_eq!(git.resolve_ref("HEAD").unwrap(), second.to_string());
    assert_eq!(git.resolve_ref("main").unwrap(), second.to_string());
    assert_eq!(git.resolve_ref("release").unwrap(), first.to_string());
    let short = &first.to_string()[..8];
    assert_eq!(git.resolve_ref(short).unwrap(), first.to_string());
    assert!(git.resolve_ref("does-not-exist").is_err());
}

#[test]
fn current_branch_is_none_when_detached() {
    let (temp, repo, first, _) = fixture();
    let git = GitRepository::new(temp.path());
    assert_eq!(git.current_branch().unwrap().as_deref(), Some("main"));

    repo.set_head_detached(first).unwrap();
    assert_eq!(git.current_branch().unwrap(), None);
}

#[test]
fn archive_contains_revision_content() {
    let (temp, _repo, first, _) = fixture();
    let git = GitRepository::new(temp.path());
    let out = TempDir::new().unwrap();
    let archive = out.path().join("src.tar");

    git.archive(&first.to_string(), &archive).unwrap();

    let dest = out.path().join("source");
    fs::create_dir(&dest).unwrap();
    tar::Archive::new(fs::File::open(&archive).unwrap())
        .unpack(&dest)
        .unwrap();
    assert_eq!(fs::read_to_string(dest.join("manage.py")).unwrap(), "v1\n");
}

#[test]
fn archive_of_unknown_revision_fails() {
    let (temp, _repo, _, _) = fixture();
    let git = GitRepository::new(temp.path());
    let out = TempDir::new().unwrap();
    assert!(git.archive("0000000", &out.path().join("x.tar")).is_err());
}

#[test]
fn resolver_maps_references_to_stamps() {
    let (temp, _repo, first, second) = fixture();
    let resolver = StampResolver::new(Arc::new(GitRepository::new(temp.path())));

    assert_eq!(resolver.resolve(None).unwrap().as_str(), second.to_string());
    assert_eq!(
        resolver.resolve(Some(&first.to_string()[..7])).unwrap().as_str(),
        first.to_string()
    );
    let err = resolver.resolve(Some("nope")).unwrap_err();
    assert!(matches!(err, Error::RefNotFound { .. }));
}

#[test]
fn missing_repository_is_an_error() {
    let temp = TempDir::new().unwrap();
    let git = GitRepository::new(temp.path().join("absent"));
    assert!(git.resolve_ref("HEAD").is_err());
    assert!(git.current_branch().is_err());
}
