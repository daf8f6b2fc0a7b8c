//! In-memory stand-ins for the external tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stackhook_core::{
    Checkout, Compiler, ContentHash, Error, Orchestrator, ResourceFilter, ResourceKind, Result,
    SecretStore, UpSpec,
};

#[derive(Debug, Clone)]
pub struct CheckoutCall {
    pub clone_url: String,
    pub branch: String,
    pub commit_sha: String,
    pub dest: PathBuf,
    pub shallow: bool,
}

/// Writes canned files per branch instead of cloning.
#[derive(Default)]
pub struct FakeCheckout {
    files: HashMap<String, Vec<(String, String)>>,
    calls: Mutex<Vec<CheckoutCall>>,
    fail: bool,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_files(mut self, branch: &str, files: &[(&str, &str)]) -> Self {
        self.files.insert(
            branch.to_string(),
            files
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
        );
        self
    }

    pub fn calls(&self) -> Vec<CheckoutCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Checkout for FakeCheckout {
    async fn checkout(
        &self,
        clone_url: &str,
        branch: &str,
        commit_sha: &str,
        dest: &Path,
        shallow: bool,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(CheckoutCall {
            clone_url: clone_url.to_string(),
            branch: branch.to_string(),
            commit_sha: commit_sha.to_string(),
            dest: dest.to_path_buf(),
            shallow,
        });

        tokio::fs::create_dir_all(dest).await?;
        if self.fail {
            tokio::fs::write(dest.join(".partial"), b"").await?;
            return Err(Error::Checkout("fatal: repository not found".to_string()));
        }
        for (name, content) in self.files.get(branch).into_iter().flatten() {
            tokio::fs::write(dest.join(name), content).await?;
        }
        Ok(())
    }
}

const MEMORY_ROOT: &str = "/memory-secrets";

/// Secret store that never touches the filesystem. Bundles are keyed by
/// the path the store hands out.
#[derive(Default)]
pub struct MemorySecretStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    staged: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_path(clone_url_hash: &ContentHash) -> PathBuf {
        Path::new(MEMORY_ROOT).join(clone_url_hash.as_str())
    }

    pub fn insert(&self, clone_url_hash: &ContentHash, bundle: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(Self::live_path(clone_url_hash), bundle.as_bytes().to_vec());
    }

    pub fn contains(&self, clone_url_hash: &ContentHash) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&Self::live_path(clone_url_hash))
    }

    /// Number of stored files, staged ones included.
    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn locate(&self, clone_url_hash: &ContentHash) -> Result<Option<PathBuf>> {
        Ok(self
            .contains(clone_url_hash)
            .then(|| Self::live_path(clone_url_hash)))
    }

    async fn stage(&self, clone_url_hash: &ContentHash, bundle: &[u8]) -> Result<PathBuf> {
        let n = self.staged.fetch_add(1, Ordering::SeqCst);
        let path =
            Path::new(MEMORY_ROOT).join(format!(".{}.{}.staged", clone_url_hash.as_str(), n));
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), bundle.to_vec());
        Ok(path)
    }

    async fn promote(&self, clone_url_hash: &ContentHash, staged: &Path) -> Result<PathBuf> {
        let mut files = self.files.lock().unwrap();
        let bundle = files
            .remove(staged)
            .ok_or_else(|| Error::Internal(format!("nothing staged at {}", staged.display())))?;
        let path = Self::live_path(clone_url_hash);
        files.insert(path.clone(), bundle);
        Ok(path)
    }

    async fn discard(&self, staged: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(staged);
        Ok(())
    }
}

/// Treats sources as already-compiled YAML. A source starting with
/// `!fail` fails to compile, quoting the source in the error like pkl does.
#[derive(Default)]
pub struct FakeCompiler {
    secrets: Option<std::sync::Arc<MemorySecretStore>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secrets(secrets: std::sync::Arc<MemorySecretStore>) -> Self {
        Self {
            secrets: Some(secrets),
            ..Self::default()
        }
    }

    /// `(file name, branch)` per compilation.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, source: &Path, branch: &str) -> Result<Vec<u8>> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((name, branch.to_string()));

        let bytes = match self.secrets.as_ref().and_then(|s| s.read(source)) {
            Some(bytes) => bytes,
            None => tokio::fs::read(source)
                .await
                .map_err(|e| Error::Compile(e.to_string()))?,
        };
        if bytes.starts_with(b"!fail") {
            return Err(Error::Compile(format!(
                "`pkl eval` failed (exit code Some(1)): -- Pkl Error --\n{}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        Ok(bytes)
    }
}

#[derive(Debug, Clone)]
struct FakeResource {
    kind: ResourceKind,
    name: String,
    /// Compose project label.
    project: Option<String>,
    running: bool,
}

/// Records every call and keeps a toy resource inventory.
///
/// `up` creates `<project>-web-1`, `<project>_default` and `<project>_data`,
/// all labelled with the project.
#[derive(Default)]
pub struct FakeOrchestrator {
    resources: Mutex<Vec<FakeResource>>,
    calls: Mutex<Vec<String>>,
    ups: Mutex<Vec<UpSpec>>,
    manifests: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
    reject_manifests: AtomicBool,
    up_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_up_delay(delay: Duration) -> Self {
        Self {
            up_delay: delay,
            ..Self::default()
        }
    }

    /// Fail every call whose recorded name starts with `op`.
    pub fn fail_on(&self, op: &str) {
        *self.fail_on.lock().unwrap() = Some(op.to_string());
    }

    pub fn reject_manifests(&self) {
        self.reject_manifests.store(true, Ordering::SeqCst);
    }

    pub fn seed(&self, kind: ResourceKind, name: &str, project: Option<&str>, running: bool) {
        self.resources.lock().unwrap().push(FakeResource {
            kind,
            name: name.to_string(),
            project: project.map(str::to_string),
            running,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ups(&self) -> Vec<UpSpec> {
        self.ups.lock().unwrap().clone()
    }

    /// Manifest contents as seen by each `up`.
    pub fn manifests(&self) -> Vec<String> {
        self.manifests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.resources
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.name.clone())
            .collect()
    }

    fn record(&self, call: String) -> Result<()> {
        let fail = self
            .fail_on
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|op| call.starts_with(op.as_str()));
        self.calls.lock().unwrap().push(call.clone());
        if fail {
            return Err(Error::Orchestrator(format!("{} failed", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn validate(&self, _manifest: &Path, _project_dir: &Path) -> Result<()> {
        self.record("validate".to_string())?;
        if self.reject_manifests.load(Ordering::SeqCst) {
            return Err(Error::ManifestInvalid("services.web: invalid".to_string()));
        }
        Ok(())
    }

    async fn up(&self, spec: &UpSpec) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.up_delay.is_zero() {
            tokio::time::sleep(self.up_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.record(format!("up:{}", spec.project_name))?;
        let manifest = std::fs::read_to_string(&spec.manifest)?;
        self.manifests.lock().unwrap().push(manifest);
        self.ups.lock().unwrap().push(spec.clone());

        let project = &spec.project_name;
        let mut resources = self.resources.lock().unwrap();
        for (kind, name) in [
            (ResourceKind::Container, format!("{}-web-1", project)),
            (ResourceKind::Network, format!("{}_default", project)),
            (ResourceKind::Volume, format!("{}_data", project)),
        ] {
            match resources.iter_mut().find(|r| r.kind == kind && r.name == name) {
                Some(existing) => existing.running = true,
                None => resources.push(FakeResource {
                    kind,
                    name,
                    project: Some(project.clone()),
                    running: true,
                }),
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        filter: &ResourceFilter,
        include_stopped: bool,
    ) -> Result<Vec<String>> {
        self.record(format!("list:{}", kind))?;
        Ok(self
            .resources
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.kind == kind && filter.matches(&r.name, r.project.as_deref()))
            .filter(|r| include_stopped || r.running || kind != ResourceKind::Container)
            .map(|r| r.name.clone())
            .collect())
    }

    async fn stop(&self, ids: &[String]) -> Result<()> {
        self.record(format!("stop:{}", ids.len()))?;
        for r in self.resources.lock().unwrap().iter_mut() {
            if r.kind == ResourceKind::Container && ids.contains(&r.name) {
                r.running = false;
            }
        }
        Ok(())
    }

    async fn remove(&self, kind: ResourceKind, ids: &[String]) -> Result<()> {
        self.record(format!("remove:{}:{}", kind, ids.len()))?;
        self.resources
            .lock()
            .unwrap()
            .retain(|r| !(r.kind == kind && ids.contains(&r.name)));
        Ok(())
    }
}
