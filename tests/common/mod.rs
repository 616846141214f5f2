#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use featureflag_rs::{
    create_app,
    handlers::USER_ID_HEADER,
    observability::TracedStore,
    repositories::{InMemoryStore, TableStore},
    ApiState, Metrics, Repositories, TableNames,
};
use reqwest::{Client, RequestBuilder};
use tokio::net::TcpListener;

/// Items per store response; small so multi-page reads are exercised
pub const STORE_PAGE_ITEMS: usize = 2;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestEnvironment {
    pub client: Client,
    pub base_url: String,
    pub store: Arc<InMemoryStore>,
    pub metrics: Arc<Metrics>,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        let tables = TableNames::default();
        let store = Arc::new(InMemoryStore::with_tables(&tables).with_max_page_items(STORE_PAGE_ITEMS));
        let metrics = Arc::new(Metrics::new().expect("Failed to create metrics"));

        let traced: Arc<dyn TableStore> =
            Arc::new(TracedStore::new(store.clone(), metrics.clone()));
        let repositories = Repositories::new(traced, &tables);
        let app = create_app(
            ApiState::new(repositories, Some(metrics.clone())),
            metrics.clone(),
            true,
            REQUEST_TIMEOUT,
        );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to serve app");
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            client: Client::new(),
            base_url,
            store,
            metrics,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, user_id: &str, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(USER_ID_HEADER, user_id)
    }

    pub fn post(&self, user_id: &str, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header(USER_ID_HEADER, user_id)
    }

    pub fn delete(&self, user_id: &str, path: &str) -> RequestBuilder {
        self.client
            .delete(self.url(path))
            .header(USER_ID_HEADER, user_id)
    }
}
