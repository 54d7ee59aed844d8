//! Application context: the clients, the shared query cache and the
//! canonical queries and mutations built on them.

mod error;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{
    EXAMPLE_KEY, EXAMPLES_KEY, InvalidationRegistry, MutationKind, QueryCache, QueryCacheConfig,
    QueryHandle, QueryKey, QueryOptions, USER_INFO_KEY,
};
use crate::config::Settings;
use crate::domain::{ExampleRecord, UserInfo};
use crate::mutation::MutationRunner;
use crate::resource::{ClientError, ResourceClient, SessionClient};
use crate::transport::{BaseUrlSource, HttpTransport, resolve_base_url};

pub use error::AppError;

pub type CreateExample = MutationRunner<ExampleRecord, (), ClientError>;
pub type ReplaceExample = MutationRunner<ExampleRecord, (), ClientError>;
pub type DeleteExample = MutationRunner<String, (), ClientError>;

/// Everything a front end needs, passed around by reference.
#[derive(Clone)]
pub struct AppContext {
    examples: ResourceClient,
    session: SessionClient,
    cache: QueryCache,
    registry: Arc<InvalidationRegistry>,
}

impl AppContext {
    pub fn new(
        examples: ResourceClient,
        session: SessionClient,
        cache: QueryCache,
        registry: Arc<InvalidationRegistry>,
    ) -> Self {
        let context = Self {
            examples,
            session,
            cache,
            registry,
        };
        let list_writers = context.refreshed_by(&QueryKey::new(EXAMPLES_KEY));
        if list_writers.is_empty() {
            warn!("No mutation refreshes the example list; writes will leave it stale");
        } else {
            debug!(writers = ?list_writers, "Example list refresh wiring");
        }
        context
    }

    /// Mutation kinds whose success marks `key` stale, sorted by name.
    pub fn refreshed_by(&self, key: &QueryKey) -> Vec<MutationKind> {
        let mut kinds: Vec<_> = self.registry.kinds_for_key(key).into_iter().collect();
        kinds.sort();
        kinds
    }

    /// Resolve base URLs and build HTTP clients from settings.
    ///
    /// Must be called from within a Tokio runtime; the cache spawns its
    /// fetches there.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let transport = &settings.transport;
        let source = BaseUrlSource {
            location: &transport.location,
            development: transport.development,
            dev_override: &transport.dev_override_url,
        };
        let api_base = resolve_base_url(&source, &transport.api_suffix)?;
        let auth_base = resolve_base_url(&source, &transport.auth_suffix)?;
        info!(api_base = %api_base, auth_base = %auth_base, "Resolved service base URLs");

        let api = HttpTransport::new(api_base, Some(transport.timeout))?;
        let auth = HttpTransport::new(auth_base, Some(transport.timeout))?;
        let cache = QueryCache::from_current(QueryCacheConfig::from(&settings.cache))?;

        Ok(Self::new(
            ResourceClient::new(Arc::new(api)),
            SessionClient::new(Arc::new(auth)),
            cache,
            Arc::new(InvalidationRegistry::examples()),
        ))
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<InvalidationRegistry> {
        &self.registry
    }

    /// The sorted record list under `"examples"`.
    pub fn examples_query(&self) -> QueryHandle<Vec<ExampleRecord>> {
        let client = self.examples.clone();
        self.cache.subscribe(EXAMPLES_KEY, move || {
            let client = client.clone();
            async move { client.list().await }
        })
    }

    /// One record under `["example", name]`.
    ///
    /// With no name selected the subscription is disabled and stays idle
    /// under the bare `"example"` key.
    pub fn example_query(&self, name: Option<&str>) -> QueryHandle<Option<ExampleRecord>> {
        let selected = name.filter(|name| !name.is_empty()).map(str::to_owned);
        let key = match &selected {
            Some(name) => QueryKey::new(EXAMPLE_KEY).with(name.clone()),
            None => QueryKey::new(EXAMPLE_KEY),
        };
        let options = QueryOptions::enabled(selected.is_some());
        let client = self.examples.clone();
        self.cache.subscribe_with(key, options, move || {
            let client = client.clone();
            let name = selected.clone();
            async move { client.get(name.as_deref()).await }
        })
    }

    pub fn user_info_query(&self) -> QueryHandle<UserInfo> {
        let client = self.session.clone();
        self.cache.subscribe(USER_INFO_KEY, move || {
            let client = client.clone();
            async move { client.user_info().await }
        })
    }

    pub fn create_example(&self) -> CreateExample {
        let client = self.examples.clone();
        MutationRunner::new(
            MutationKind::CREATE_EXAMPLE,
            self.cache.clone(),
            Arc::clone(&self.registry),
            move |record: ExampleRecord| {
                let client = client.clone();
                async move { client.create(&record).await }
            },
        )
    }

    /// Replace the record at `name`; the name in the submitted record is
    /// ignored.
    pub fn replace_example(&self, name: &str) -> ReplaceExample {
        let client = self.examples.clone();
        let name = name.to_string();
        MutationRunner::new(
            MutationKind::REPLACE_EXAMPLE,
            self.cache.clone(),
            Arc::clone(&self.registry),
            move |record: ExampleRecord| {
                let client = client.clone();
                let name = name.clone();
                async move { client.replace(&name, &record).await }
            },
        )
    }

    pub fn delete_example(&self) -> DeleteExample {
        let client = self.examples.clone();
        MutationRunner::new(
            MutationKind::DELETE_EXAMPLE,
            self.cache.clone(),
            Arc::clone(&self.registry),
            move |name: String| {
                let client = client.clone();
                async move { client.delete(&name).await }
            },
        )
    }
}

/// Wait for `handle` to settle and return its data or the shared error.
pub async fn resolve<T: Send + Sync + 'static>(
    handle: &QueryHandle<T>,
) -> Result<Arc<T>, AppError> {
    match handle.settled().await.into_result() {
        Ok(Some(data)) => Ok(data),
        Ok(None) => Err(AppError::NoData {
            key: handle.key().clone(),
        }),
        Err(source) => Err(AppError::query(handle.key(), source)),
    }
}
