//! # Torrent Daemon HTTP Bridge
//!
//! [`TorrentClient`] over a small JSON bridge in front of the torrent daemon.
//! Both calls are `POST`s carrying the requested field list:
//!
//! - `POST {base}/torrents` with `{"fields": [...]}` returns an array of
//!   torrent records;
//! - `POST {base}/transfer-summary` with `{"fields": [...]}` returns one
//!   summary object.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Method;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::ingestors::torrent_client::{TorrentClient, TorrentDetails, TransferSummary};
use crate::retrieve::ky_http::ApiClient;

const TORRENTS_PATH: &str = "torrents";
const TRANSFER_SUMMARY_PATH: &str = "transfer-summary";

#[derive(Serialize)]
struct FieldsRequest<'a> {
    fields: &'a [&'a str],
}

/// # HTTP Torrent Client
pub struct HttpTorrentClient {
    api: ApiClient,
}

impl HttpTorrentClient {
    /// Connects to the bridge at `base_url`. A missing trailing slash is
    /// added so relative paths resolve below it.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let base = normalize_base(base_url)?;
        Ok(Self {
            api: ApiClient::new(base.as_str(), token, timeout)?,
        })
    }

    async fn post_fields<T: serde::de::DeserializeOwned>(&self, path: &str, fields: &[&str]) -> Result<T, FetchError> {
        self.api
            .request::<T, _>(Method::POST, path, None, Some(FieldsRequest { fields }))
            .await?
            .into_data()
    }
}

impl TorrentClient for HttpTorrentClient {
    fn fetch_torrent_list<'a>(
        &'a self,
        fields: &'a [&'a str],
    ) -> BoxFuture<'a, Result<Vec<TorrentDetails>, FetchError>> {
        self.post_fields(TORRENTS_PATH, fields).boxed()
    }

    fn fetch_transfer_summary<'a>(&'a self, fields: &'a [&'a str]) -> BoxFuture<'a, Result<TransferSummary, FetchError>> {
        self.post_fields(TRANSFER_SUMMARY_PATH, fields).boxed()
    }
}

fn normalize_base(base_url: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(base_url).map_err(|error| {
        tracing::error!(base_url, %error, "invalid torrent client URL");
        FetchError::Unavailable
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
