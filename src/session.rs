//! Session lifecycle and orchestration.
//!
//! A [`Session`] connects the pieces: the provider registry, the ledger,
//! the worker pool, enrichment, progress rendering and the artwork
//! cache. All long-lived resources are acquired at startup and released
//! deterministically by [`Session::finish`] on every exit path.
//!
//! The data pipeline:
//!
//! ```text
//! input URL -> ParsedUrl -> Pending -> Media -> DownloadTask -> file
//! ```
//!
//! Track references go straight onto the global download queue; container
//! references resolve concurrently and expand into queued tracks
//! themselves. Per-item failures never abort the session - only
//! configuration and authentication errors do.

use std::{collections::HashMap, sync::Arc, time::Duration};

use exponential_backoff::Backoff;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    client::{Client, DeezerClient, MediaKind, Source},
    config::Config,
    db::Ledger,
    error::{Error, Result},
    media::{
        ArtworkCache, Context, Pending, PendingAlbum, PendingArtist, PendingLabel,
        PendingLastfmPlaylist, PendingPlaylist, PendingSingle, PendingUserFavorites,
    },
    metadata::SearchResults,
    parse_url::{parse_url, ParsedUrl},
    progress::Progress,
    queue::{QueueHandle, WorkerPool},
    rym::RymService,
};

/// Login retry attempts before giving up.
const LOGIN_ATTEMPTS: u32 = 5;

/// Minimum backoff between login retries.
const MIN_BACKOFF: Duration = Duration::from_millis(100);

/// Maximum backoff between login retries.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// One queued unit of user intent.
enum Item {
    /// A single track, fed through the download queue.
    Track {
        source: Source,
        id: String,
        pending: Box<dyn Pending>,
    },

    /// A container that expands into queued tracks itself.
    Container(Box<dyn Pending>),
}

/// A download session.
pub struct Session {
    config: Arc<Config>,
    ledger: Arc<Ledger>,
    pool: WorkerPool,
    queue: QueueHandle,
    clients: HashMap<Source, Arc<dyn Client>>,
    rym: Option<Arc<RymService>>,
    progress: Progress,
    artwork: Arc<ArtworkCache>,
    http: reqwest::Client,
    shutdown: CancellationToken,
    pending: Vec<Item>,
    workers_started: bool,
}

impl Session {
    /// Acquires the session's long-lived resources and registers the
    /// built-in provider adapters.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Config` for invalid configuration and
    /// `ErrorKind::Io` when the ledger cannot be opened.
    pub async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let config = Arc::new(config);
        let max_connections = config.downloads.max_connections;

        let ledger = if config.cli.dry_run {
            Arc::new(Ledger::dummy())
        } else {
            Arc::new(Ledger::open(&config.database).await?)
        };

        let mut pool = WorkerPool::new(max_connections, Arc::clone(&ledger), shutdown.clone());
        let queue = pool.handle();
        pool.start(max_connections);

        let rym = if config.rym.enabled {
            match RymService::new(&config.rym, max_connections) {
                Ok(service) => {
                    info!("metadata enrichment enabled");
                    Some(Arc::new(service))
                }
                Err(e) => {
                    warn!("failed to initialize enrichment service: {e}");
                    None
                }
            }
        } else {
            None
        };

        let mut clients: HashMap<Source, Arc<dyn Client>> = HashMap::new();
        if config.deezer.arl.is_some() {
            let deezer = DeezerClient::new(&config.deezer, max_connections)?;
            clients.insert(Source::Deezer, Arc::new(deezer));
        }

        Ok(Self {
            progress: Progress::new(config.cli.progress_bars && !config.cli.dry_run),
            artwork: Arc::new(ArtworkCache::new()),
            http: reqwest::Client::new(),
            rym,
            queue,
            pool,
            ledger,
            clients,
            config,
            shutdown,
            pending: Vec::new(),
            workers_started: true,
        })
    }

    /// Registers an external provider adapter.
    ///
    /// The built-in registry only covers Deezer; adapters for the other
    /// providers plug in here.
    pub fn register_client(&mut self, client: Arc<dyn Client>) {
        self.clients.insert(client.source(), client);
    }

    /// Returns a logged-in client for `source`, retrying transient
    /// login failures with exponential backoff.
    ///
    /// # Errors
    ///
    /// * `ErrorKind::MissingCredentials` when no adapter is registered
    /// * `ErrorKind::Auth` when the provider rejects the credentials
    pub async fn logged_in_client(&self, source: Source) -> Result<Arc<dyn Client>> {
        let client = self
            .clients
            .get(&source)
            .ok_or_else(|| {
                Error::missing_credentials(format!("no client configured for {source}"))
            })?
            .clone();

        if client.logged_in() {
            return Ok(client);
        }

        for (attempt, backoff) in Backoff::new(LOGIN_ATTEMPTS, MIN_BACKOFF, MAX_BACKOFF)
            .into_iter()
            .enumerate()
        {
            match client.login().await {
                Ok(()) => return Ok(client),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => match backoff {
                    Some(duration) => {
                        warn!(
                            "login to {source} failed ({e}), retrying in {duration:?} \
                             ({}/{LOGIN_ATTEMPTS})",
                            attempt + 1
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(e),
                },
            }
        }

        Err(Error::auth(format!("login to {source} did not succeed")))
    }

    fn context(&self, client: Arc<dyn Client>) -> Context {
        Context {
            client,
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            queue: self.queue.clone(),
            rym: self.rym.clone(),
            progress: self.progress.clone(),
            artwork: Arc::clone(&self.artwork),
            http: self.http.clone(),
        }
    }

    /// Adds a URL as a pending item.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidUrl` for unrecognized input; the
    /// caller decides whether that skips the item or aborts.
    pub async fn add(&mut self, url: &str) -> Result<()> {
        let parsed =
            parse_url(url).ok_or_else(|| Error::invalid_url(format!("unable to parse {url}")))?;

        // Short-links need one round trip before the kind and id are
        // known.
        let parsed = match parsed {
            ParsedUrl::DeezerDynamic { .. } => parsed.resolve_dynamic(&self.http).await?,
            other => other,
        };

        let client = self.logged_in_client(parsed.source()).await?;
        let ctx = self.context(client);

        let item = match parsed {
            ParsedUrl::Item { source, kind, id } => match kind {
                MediaKind::Track => Item::Track {
                    source,
                    pending: Box::new(PendingSingle {
                        id: id.clone(),
                        ctx,
                    }),
                    id,
                },
                MediaKind::Album => Item::Container(Box::new(PendingAlbum { id, ctx })),
                MediaKind::Artist => Item::Container(Box::new(PendingArtist { id, ctx })),
                MediaKind::Label => Item::Container(Box::new(PendingLabel { id, ctx })),
                MediaKind::Playlist => Item::Container(Box::new(PendingPlaylist { id, ctx })),
                MediaKind::Favorites => {
                    return Err(Error::invalid_url("favorites need a profile URL"))
                }
            },
            ParsedUrl::Favorites {
                user_id, kind, ..
            } => Item::Container(Box::new(PendingUserFavorites { user_id, kind, ctx })),
            ParsedUrl::Soundcloud { url } => {
                // SoundCloud permalinks resolve through the provider;
                // the adapter interprets the URL as the id.
                Item::Track {
                    source: Source::Soundcloud,
                    pending: Box::new(PendingSingle {
                        id: url.clone(),
                        ctx,
                    }),
                    id: url,
                }
            }
            ParsedUrl::DeezerDynamic { url } => {
                return Err(Error::invalid_url(format!("unresolvable short-link {url}")))
            }
        };

        self.pending.push(item);
        debug!("added url={url}");
        Ok(())
    }

    /// Adds multiple URLs, skipping (and logging) unparseable ones.
    ///
    /// # Errors
    ///
    /// Returns fatal (configuration/authentication) errors only.
    pub async fn add_all(&mut self, urls: &[String]) -> Result<()> {
        for url in urls {
            match self.add(url).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!("found invalid url {url}, skipping: {e}"),
            }
        }
        Ok(())
    }

    /// Adds a provider object by source, kind and id.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from client login, and `ErrorKind::InvalidUrl`
    /// for kinds that cannot be addressed by id.
    pub async fn add_by_id(&mut self, source: Source, kind: MediaKind, id: &str) -> Result<()> {
        let client = self.logged_in_client(source).await?;
        let ctx = self.context(client);

        let id = id.to_string();
        let item = match kind {
            MediaKind::Track => Item::Track {
                source,
                pending: Box::new(PendingSingle {
                    id: id.clone(),
                    ctx,
                }),
                id,
            },
            MediaKind::Album => Item::Container(Box::new(PendingAlbum { id, ctx })),
            MediaKind::Artist => Item::Container(Box::new(PendingArtist { id, ctx })),
            MediaKind::Label => Item::Container(Box::new(PendingLabel { id, ctx })),
            MediaKind::Playlist => Item::Container(Box::new(PendingPlaylist { id, ctx })),
            MediaKind::Favorites => {
                return Err(Error::invalid_url("favorites cannot be added by id"))
            }
        };

        self.pending.push(item);
        Ok(())
    }

    /// Adds a Last.fm playlist for resolution through provider search.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from client login.
    pub async fn add_lastfm(&mut self, playlist_url: &str) -> Result<()> {
        let lastfm = &self.config.lastfm;
        let client = self.logged_in_client(lastfm.source).await?;

        let fallback = match lastfm.fallback_source {
            Some(source) => Some(self.logged_in_client(source).await?),
            None => None,
        };

        let ctx = self.context(client);
        self.pending.push(Item::Container(Box::new(PendingLastfmPlaylist {
            url: playlist_url.to_string(),
            ctx,
            fallback,
        })));
        Ok(())
    }

    /// Processes everything added so far: tracks go onto the download
    /// queue, containers resolve concurrently and expand themselves.
    /// Returns when all work has terminated.
    pub async fn process_pending(&mut self) {
        let items: Vec<Item> = self.pending.drain(..).collect();
        if items.is_empty() {
            return;
        }

        let mut completions = Vec::new();
        let mut containers: JoinSet<()> = JoinSet::new();

        for item in items {
            match item {
                Item::Track {
                    source,
                    id,
                    pending,
                } => {
                    let descriptor = format!("track {id}");
                    completions.push(self.queue.submit(pending, descriptor, source, id));
                }
                Item::Container(pending) => {
                    containers.spawn(async move {
                        match pending.resolve().await {
                            Ok(Some(mut media)) => {
                                if let Err(e) = media.rip().await {
                                    error!("error processing item: {e}");
                                }
                            }
                            Ok(None) => {}
                            Err(e) => error!("error resolving item: {e}"),
                        }
                    });
                }
            }
        }

        while containers.join_next().await.is_some() {}
        for completion in completions {
            let _ = completion.await;
        }

        info!("all downloads completed");
    }

    /// Interactive search: prints a numbered result list and queues the
    /// selections read from stdin.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from client login and I/O errors reading
    /// the selection.
    pub async fn search_interactive(
        &mut self,
        source: Source,
        kind: MediaKind,
        query: &str,
    ) -> Result<()> {
        let results = self.search(source, kind, query, 20).await?;
        if results.results.is_empty() {
            self.progress.println(&format!("no search results for {query:?}"));
            return Ok(());
        }

        for line in results.summaries() {
            self.progress.println(&line);
        }
        self.progress
            .println("enter numbers to download (space-separated), or nothing to exit:");

        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(Error::io)?;

        for token in line.split_whitespace() {
            let Ok(index) = token.parse::<usize>() else {
                warn!("ignoring invalid selection {token:?}");
                continue;
            };
            match results.results.get(index.wrapping_sub(1)) {
                Some(result) => {
                    self.add_by_id(source, result.media_type, &result.id).await?;
                }
                None => warn!("ignoring out-of-range selection {index}"),
            }
        }
        Ok(())
    }

    /// Search and queue the top hit.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from client login.
    pub async fn search_take_first(
        &mut self,
        source: Source,
        kind: MediaKind,
        query: &str,
    ) -> Result<()> {
        let results = self.search(source, kind, query, 1).await?;
        match results.results.first() {
            Some(first) => {
                let id = first.id.clone();
                let media_type = first.media_type;
                self.add_by_id(source, media_type, &id).await
            }
            None => {
                self.progress.println(&format!("no search results for {query:?}"));
                Ok(())
            }
        }
    }

    /// Search and write the results to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns fatal errors from client login and I/O errors writing
    /// the file.
    pub async fn search_output_file(
        &mut self,
        source: Source,
        kind: MediaKind,
        query: &str,
        path: &std::path::Path,
        limit: usize,
    ) -> Result<()> {
        let results = self.search(source, kind, query, limit).await?;
        let contents = serde_json::to_string_pretty(&results.as_json())?;
        tokio::fs::write(path, contents).await?;
        self.progress.println(&format!(
            "wrote {} results to {}",
            results.results.len(),
            path.display()
        ));
        Ok(())
    }

    async fn search(
        &self,
        source: Source,
        kind: MediaKind,
        query: &str,
        limit: usize,
    ) -> Result<SearchResults> {
        let client = self.logged_in_client(source).await?;
        info!("searching {source} for {query:?}");
        let pages = client.search(kind, query, limit).await?;
        Ok(SearchResults::from_pages(source, kind, &pages))
    }

    /// Releases the session's resources and prints the failure summary.
    ///
    /// Safe to call on every exit path, including after a shutdown
    /// signal.
    pub async fn finish(&mut self) {
        if self.workers_started {
            self.pool.stop().await;
            self.workers_started = false;
        }
        self.artwork.clear().await;

        let stats = self.queue.stats();
        let failed = stats.failed();
        if failed > 0 {
            self.progress.println(&format!(
                "Download completed with {failed} failed items out of {}",
                stats.total()
            ));
        }
    }

    /// Whether a shutdown signal has been observed.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
