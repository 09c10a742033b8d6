#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use filetime::FileTime;
use tempfile::TempDir;

use shipyard_core::audit::AuditLog;
use shipyard_core::database::Database;
use shipyard_core::deploy::{Collaborators, DeployOptions, DeployReport, Deployer};
use shipyard_core::layout::{InstancePaths, ProjectLayout};
use shipyard_core::provision::Provisioner;
use shipyard_core::reload::ReloadSignal;
use shipyard_core::remote::{CommandOutput, DirEntry, Executor, LocalExecutor, RemoteError};
use shipyard_core::rollback::RollbackManager;
use shipyard_core::stamp::Stamp;
use shipyard_core::store::InstanceStore;
use shipyard_core::vcs::Vcs;

pub const ENVIRONMENT: &str = "staging";
pub const ACTOR: &str = "tester";
pub const INITIAL_DB: &str = "schema v0\n";

pub fn stamp(value: &str) -> Stamp {
    Stamp::new(value).unwrap()
}

/// In-memory repository whose archives contain a tiny project.
#[derive(Default)]
pub struct FakeVcs {
    revisions: Mutex<HashSet<String>>,
    branches: Mutex<HashMap<String, String>>,
    head: Mutex<Option<String>>,
}

impl FakeVcs {
    pub fn add_revision(&self, revision: &str) {
        self.revisions.lock().unwrap().insert(revision.to_string());
    }

    pub fn add_branch(&self, branch: &str, revision: &str) {
        self.add_revision(revision);
        self.branches
            .lock()
            .unwrap()
            .insert(branch.to_string(), revision.to_string());
    }

    pub fn set_head(&self, revision: &str) {
        self.add_revision(revision);
        *self.head.lock().unwrap() = Some(revision.to_string());
    }

    pub fn forget_revision(&self, revision: &str) {
        self.revisions.lock().unwrap().remove(revision);
    }
}

impl Vcs for FakeVcs {
    fn resolve_ref(&self, reference: &str) -> anyhow::Result<String> {
        if reference == "HEAD" {
            return match self.head.lock().unwrap().clone() {
                Some(head) => Ok(head),
                None => bail!("no HEAD"),
            };
        }
        if let Some(rev) = self.branches.lock().unwrap().get(reference) {
            return Ok(rev.clone());
        }
        if self.revisions.lock().unwrap().contains(reference) {
            return Ok(reference.to_string());
        }
        bail!("unknown reference {}", reference)
    }

    fn current_branch(&self) -> anyhow::Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    fn archive(&self, revision: &str, dest: &Path) -> anyhow::Result<()> {
        if !self.revisions.lock().unwrap().contains(revision) {
            bail!("revision {} not in repository", revision);
        }
        let mut builder = tar::Builder::new(File::create(dest)?);
        for (name, body) in [
            ("manage.py", format!("# revision {}\n", revision)),
            ("requirements.txt", "django\n".to_string()),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, body.as_bytes())?;
        }
        builder.finish()?;
        Ok(())
    }
}

/// A database whose entire state is one local file.
pub struct FakeDatabase {
    state: PathBuf,
    fail_migrate: Mutex<HashSet<String>>,
    fail_restore: AtomicBool,
    restores: AtomicUsize,
}

impl FakeDatabase {
    pub fn new(state: PathBuf) -> Self {
        fs::write(&state, INITIAL_DB).unwrap();
        Self {
            state,
            fail_migrate: Mutex::new(HashSet::new()),
            fail_restore: AtomicBool::new(false),
            restores: AtomicUsize::new(0),
        }
    }

    pub fn contents(&self) -> String {
        fs::read_to_string(&self.state).unwrap()
    }

    pub fn fail_migrate_for(&self, stamp: &str) {
        self.fail_migrate.lock().unwrap().insert(stamp.to_string());
    }

    pub fn fail_restore(&self) {
        self.fail_restore.store(true, Ordering::SeqCst);
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

fn instance_name(instance: &InstancePaths) -> String {
    instance
        .root
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

impl Database for FakeDatabase {
    fn snapshot(&self, _instance: &InstancePaths, dest: &Path) -> anyhow::Result<()> {
        fs::copy(&self.state, dest)?;
        Ok(())
    }

    fn restore(&self, _instance: &InstancePaths, src: &Path) -> anyhow::Result<()> {
        if self.fail_restore.load(Ordering::SeqCst) {
            bail!("restore refused");
        }
        fs::copy(src, &self.state)?;
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn migrate(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        let name = instance_name(instance);
        let mut file = OpenOptions::new().append(true).open(&self.state)?;
        writeln!(file, "partial migration {}", name)?;
        if self.fail_migrate.lock().unwrap().contains(&name) {
            bail!("migration for {} failed", name);
        }
        writeln!(file, "migrated {}", name)?;
        Ok(())
    }
}

/// Creates the runtime folder; can be told to fail one step.
#[derive(Default)]
pub struct FakeProvisioner {
    fail_step: Mutex<Option<&'static str>>,
}

impl FakeProvisioner {
    pub fn fail_on(&self, step: &'static str) {
        *self.fail_step.lock().unwrap() = Some(step);
    }

    fn check(&self, step: &'static str) -> anyhow::Result<()> {
        if *self.fail_step.lock().unwrap() == Some(step) {
            bail!("{} exploded", step);
        }
        Ok(())
    }
}

impl Provisioner for FakeProvisioner {
    fn build_environment(&self, instance: &InstancePaths) -> anyhow::Result<()> {
        self.check("build_environment")?;
        fs::create_dir_all(instance.env.join("bin"))?;
        Ok(())
    }

    fn install_dependencies(&self, _instance: &InstancePaths) -> anyhow::Result<()> {
        self.check("install_dependencies")
    }

    fn build_assets(&self, _instance: &InstancePaths) -> anyhow::Result<()> {
        self.check("build_assets")
    }
}

#[derive(Default)]
pub struct RecordingReload {
    count: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingReload {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl ReloadSignal for RecordingReload {
    fn notify(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("application did not restart");
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A project root in a temp directory with fake collaborators.
pub struct Harness {
    pub temp: TempDir,
    pub root: PathBuf,
    pub executor: Arc<LocalExecutor>,
    pub vcs: Arc<FakeVcs>,
    pub database: Arc<FakeDatabase>,
    pub provisioner: Arc<FakeProvisioner>,
    pub reload: Arc<RecordingReload>,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("vhosts").join("s-site");
        fs::create_dir_all(root.join("media")).unwrap();
        fs::write(root.join("media").join("logo.png"), "png").unwrap();
        fs::write(root.join("settings.py"), "DEBUG = False\n").unwrap();

        let database = Arc::new(FakeDatabase::new(temp.path().join("db.sql")));
        let vcs = Arc::new(FakeVcs::default());
        for rev in ["aaa111", "bbb222", "ccc333", "ddd444", "eee555"] {
            vcs.add_revision(rev);
        }

        Self {
            root,
            executor: Arc::new(LocalExecutor::new()),
            vcs,
            database,
            provisioner: Arc::new(FakeProvisioner::default()),
            reload: Arc::new(RecordingReload::default()),
            temp,
        }
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.root)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            executor: self.executor.clone(),
            vcs: self.vcs.clone(),
            provisioner: self.provisioner.clone(),
            database: self.database.clone(),
            reload: self.reload.clone(),
        }
    }

    pub fn store(&self) -> InstanceStore {
        InstanceStore::new(self.executor.clone(), self.layout())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(
            self.executor.clone(),
            self.layout().audit_log(),
            ENVIRONMENT,
            ACTOR,
        )
    }

    pub fn deployer(&self) -> Deployer {
        Deployer::new(
            self.store(),
            self.collaborators(),
            self.audit(),
            vec!["settings.py".to_string()],
        )
    }

    pub fn rollback_manager(&self) -> RollbackManager {
        RollbackManager::new(self.store(), self.collaborators(), self.audit())
    }

    pub fn deploy(&self, reference: &str) -> shipyard_core::Result<DeployReport> {
        self.deployer()
            .deploy(Some(reference), &DeployOptions::default())
    }

    pub fn instance_dir(&self, stamp: &str) -> PathBuf {
        self.root.join(stamp)
    }

    pub fn audit_lines(&self) -> Vec<String> {
        match fs::read_to_string(self.layout().audit_log()) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.store()
            .current_stamp()
            .unwrap()
            .map(|s| s.as_str().to_string())
    }

    pub fn previous(&self) -> Option<String> {
        self.store()
            .previous_stamp()
            .unwrap()
            .map(|s| s.as_str().to_string())
    }

    /// Instance directory with its subfolders, created at `unix_secs`.
    pub fn make_instance(&self, name: &str, unix_secs: i64) {
        let paths = self.layout().instance(&stamp(name));
        for folder in paths.subfolders() {
            fs::create_dir_all(folder).unwrap();
        }
        set_created(&paths.root, unix_secs);
    }

    /// Every path under the project root, sorted.
    pub fn tree(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        collect_tree(&self.root, &mut paths);
        paths.sort();
        paths
    }
}

pub fn set_created(dir: &Path, unix_secs: i64) {
    filetime::set_file_mtime(dir, FileTime::from_unix_time(unix_secs, 0)).unwrap();
}

fn collect_tree(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        out.push(path.clone());
        if entry.file_type().unwrap().is_dir() {
            collect_tree(&path, out);
        }
    }
}

/// Executor that fails every call, for checking best-effort paths.
pub struct BrokenExecutor;

fn broken() -> RemoteError {
    RemoteError::Spawn {
        program: "sh".to_string(),
        source: std::io::Error::other("connection lost"),
    }
}

impl Executor for BrokenExecutor {
    fn run(&self, _: &str) -> Result<CommandOutput, RemoteError> {
        Err(broken())
    }
    fn upload(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn download(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn exists(&self, _: &Path) -> Result<bool, RemoteError> {
        Err(broken())
    }
    fn symlink(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn read_link(&self, _: &Path) -> Result<Option<PathBuf>, RemoteError> {
        Err(broken())
    }
    fn remove(&self, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn rename(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn create_dir(&self, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn copy_file(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn append_line(&self, _: &Path, _: &str) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn list_dirs(
        &self,
        _: &Path,
    ) -> Result<Vec<DirEntry>, RemoteError> {
        Err(broken())
    }
    fn extract_archive(&self, _: &Path, _: &Path) -> Result<(), RemoteError> {
        Err(broken())
    }
    fn tail(&self, _: &Path, _: usize) -> Result<Vec<String>, RemoteError> {
        Err(broken())
    }
}
