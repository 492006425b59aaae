//! Dynamic client provider
//!
//! Holds the one live control-plane handle and swaps it whenever the
//! kubeconfig file changes on disk.
//!
//! Callers take a [`ClientLease`] for the whole sequence of dependent calls
//! they make. A lease pins the handle that was current when it was taken, so
//! a reload in the middle of the sequence cannot replace the handle under
//! the caller; the next lease sees the new handle. The swap cell is only
//! locked long enough to clone or replace the pointer, and handles are fully
//! built before they are swapped in, so readers never see a partial one.
//!
//! The watch is set up on the kubeconfig's parent directory rather than the
//! file itself: secret mounts and editors rotate the file by atomic rename,
//! which replaces the inode a file watch would be attached to.

use crate::error::ProviderError;
use crate::metal_trait::MetalApi;
use kube::config::Kubeconfig;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Turns a parsed kubeconfig into a ready-to-use handle.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, kubeconfig: Kubeconfig) -> Result<Arc<dyn MetalApi>, ProviderError>;
}

/// Owner of the shared control-plane handle.
pub struct ClientProvider {
    current: Mutex<Arc<dyn MetalApi>>,
    kubeconfig_path: PathBuf,
    factory: Arc<dyn ClientFactory>,
}

/// A handle pinned for one sequence of dependent calls; dropping it releases it.
#[derive(Clone)]
pub struct ClientLease {
    client: Arc<dyn MetalApi>,
}

impl Deref for ClientLease {
    type Target = dyn MetalApi;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl std::fmt::Debug for ClientLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLease")
            .field("endpoint", &self.client.endpoint())
            .finish()
    }
}

/// Background task reloading the client on kubeconfig changes.
#[derive(Debug)]
pub struct CredentialWatcher {
    handle: JoinHandle<Result<(), ProviderError>>,
}

impl CredentialWatcher {
    /// Waits for the watch loop to end.
    ///
    /// `Ok(())` after a shutdown request; an error means the provider can no
    /// longer observe rotations.
    pub async fn wait(&mut self) -> Result<(), ProviderError> {
        (&mut self.handle)
            .await
            .map_err(|e| ProviderError::Watch(format!("credential watcher panicked: {e}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl ClientProvider {
    /// Starts watching for rotations, then loads the kubeconfig and builds
    /// the first handle. Returns the provider together with the namespace of
    /// the kubeconfig's current context.
    pub async fn new_with_namespace(
        kubeconfig_path: impl Into<PathBuf>,
        factory: Arc<dyn ClientFactory>,
        shutdown: CancellationToken,
    ) -> Result<(Arc<Self>, String, CredentialWatcher), ProviderError> {
        let kubeconfig_path = kubeconfig_path.into();
        info!("Initializing metal client provider from {}", kubeconfig_path.display());

        // Registered before the first read so a rotation during startup is not lost.
        let watch = watch_kubeconfig(&kubeconfig_path)?;

        let kubeconfig = read_kubeconfig(&kubeconfig_path).await?;
        let namespace = namespace_from_kubeconfig(&kubeconfig)?;
        let client = factory.build(kubeconfig).await?;
        info!("Metal client created for {} (namespace {})", client.endpoint(), namespace);

        let provider = Arc::new(Self::with_client(kubeconfig_path, factory, client));
        let watcher = provider.spawn_reload_loop(watch, shutdown);
        Ok((provider, namespace, watcher))
    }

    /// Wraps an already built handle without touching the filesystem.
    pub fn with_client(
        kubeconfig_path: impl Into<PathBuf>,
        factory: Arc<dyn ClientFactory>,
        client: Arc<dyn MetalApi>,
    ) -> Self {
        Self {
            current: Mutex::new(client),
            kubeconfig_path: kubeconfig_path.into(),
            factory,
        }
    }

    /// Takes a lease on the current handle.
    pub fn acquire(&self) -> ClientLease {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        ClientLease {
            client: Arc::clone(&current),
        }
    }

    pub fn kubeconfig_path(&self) -> &Path {
        &self.kubeconfig_path
    }

    /// Re-reads the kubeconfig and swaps in a new handle.
    ///
    /// On any failure the current handle stays in place.
    pub async fn reload(&self) -> Result<(), ProviderError> {
        let kubeconfig = read_kubeconfig(&self.kubeconfig_path).await?;
        let client = self.factory.build(kubeconfig).await?;
        let endpoint = client.endpoint().to_string();
        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            *current = client;
        }
        info!("Metal client reloaded for {}", endpoint);
        Ok(())
    }

    fn spawn_reload_loop(self: &Arc<Self>, watch: KubeconfigWatch, shutdown: CancellationToken) -> CredentialWatcher {
        let KubeconfigWatch {
            fs_watcher,
            mut events,
            watched_file,
        } = watch;
        let provider = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let _fs_watcher = fs_watcher;
            info!("Credential watcher loop started");
            let result = loop {
                tokio::select! {
                    () = shutdown.cancelled() => break Ok(()),
                    event = events.recv() => match event {
                        Some(Ok(event)) => {
                            debug!("Kubeconfig directory event: {:?}", event);
                            if !event.paths.iter().any(|path| *path == watched_file) {
                                continue;
                            }
                            match provider.reload().await {
                                Ok(()) => info!("Change of kubeconfig was handled successfully"),
                                Err(e) => warn!("Couldn't update metal client when config changed, keeping previous client: {}", e),
                            }
                        }
                        Some(Err(e)) => {
                            error!("Kubeconfig watcher returned an error: {}", e);
                            break Err(ProviderError::Watch(e.to_string()));
                        }
                        None => {
                            error!("Kubeconfig watcher stopped delivering events");
                            break Err(ProviderError::Watch("event channel closed".to_string()));
                        }
                    },
                }
            };
            info!("Credential watcher loop ended");
            result
        });

        CredentialWatcher { handle }
    }
}

/// A registered directory watch whose events queue up until a loop drains them.
struct KubeconfigWatch {
    fs_watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    watched_file: PathBuf,
}

fn watch_kubeconfig(kubeconfig_path: &Path) -> Result<KubeconfigWatch, ProviderError> {
    let watch_error = |e: &dyn std::fmt::Display| {
        ProviderError::Watch(format!(
            "unable to add kubeconfig \"{}\" to watcher: {e}",
            kubeconfig_path.display()
        ))
    };

    let file_name = kubeconfig_path
        .file_name()
        .ok_or_else(|| watch_error(&"path has no file name"))?;
    let parent = match kubeconfig_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    // Events carry paths rooted at the watched directory.
    let watch_dir = parent.canonicalize().map_err(|e| watch_error(&e))?;
    let watched_file = watch_dir.join(file_name);

    let (tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut fs_watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
        // Receiver gone means the loop has ended.
        let _ = tx.send(event);
    })
    .map_err(|e| ProviderError::Watch(format!("unable to create kubeconfig watcher: {e}")))?;
    fs_watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|e| watch_error(&e))?;
    info!("Watching {} for kubeconfig changes", watch_dir.display());

    Ok(KubeconfigWatch {
        fs_watcher,
        events,
        watched_file,
    })
}

/// Reads and parses the kubeconfig at `path`.
pub async fn read_kubeconfig(path: &Path) -> Result<Kubeconfig, ProviderError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ProviderError::CredentialRead {
            path: path.to_path_buf(),
            source,
        })?;
    Kubeconfig::from_yaml(&data).map_err(|e| ProviderError::CredentialParse(e.to_string()))
}

/// Namespace of the kubeconfig's current context; absent or empty is an error.
pub fn namespace_from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<String, ProviderError> {
    let current = kubeconfig
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ProviderError::NamespaceResolution("kubeconfig has no current context".to_string()))?;
    let context = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == current)
        .and_then(|named| named.context.as_ref())
        .ok_or_else(|| ProviderError::NamespaceResolution(format!("context {current} not found in kubeconfig")))?;

    match context.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => Ok(namespace.to_string()),
        _ => Err(ProviderError::NamespaceResolution(format!(
            "got an empty namespace from context {current}"
        ))),
    }
}

/// Server URL of the cluster the current context points at.
pub fn current_cluster_server(kubeconfig: &Kubeconfig) -> Option<String> {
    let current = kubeconfig.current_context.as_deref()?;
    let context = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == current)?
        .context
        .as_ref()?;
    kubeconfig
        .clusters
        .iter()
        .find(|named| named.name == context.cluster)?
        .cluster
        .as_ref()?
        .server
        .clone()
}
