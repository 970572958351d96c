//! Tracker client module
//!
//! Builds announce requests for a torrent and asks the tracker for peers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, TorrentError};
use crate::peer::PeerAddress;
use crate::torrent::TorrentInfo;
use crate::tracker::response::AnnounceResponse;

/// Default timeout for one tracker request
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a tracker URL and returns the raw response body
#[async_trait]
pub trait TrackerTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Vec<u8>>;
}

/// HTTP transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TrackerTransport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TorrentError::transport_error(format!(
                "tracker {} answered with HTTP {}",
                url.host_str().unwrap_or_default(),
                status
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Announces torrents to their trackers
pub struct TrackerClient<T = HttpTransport> {
    transport: T,
}

impl TrackerClient<HttpTransport> {
    /// Create a client that talks HTTP
    pub fn http(timeout: Duration) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(timeout)?))
    }
}

impl<T: TrackerTransport> TrackerClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Ask the trackers for peers, returning them in tracker order
    pub async fn announce(&self, info: &TorrentInfo, peer_id: &[u8; 20], port: u16) -> Result<Vec<PeerAddress>> {
        Ok(self.announce_full(info, peer_id, port).await?.peers)
    }

    /// Announce to each tracker of the torrent in turn until one answers
    pub async fn announce_full(&self, info: &TorrentInfo, peer_id: &[u8; 20], port: u16) -> Result<AnnounceResponse> {
        let mut trackers: Vec<&str> = info.announce_list.iter().map(String::as_str).collect();
        if trackers.is_empty() {
            trackers.push(&info.announce);
        }

        let mut last_error = None;
        for tracker in trackers {
            match self.announce_to(tracker, info, peer_id, port).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Announce to {} failed: {}", tracker, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| TorrentError::config_error_with_field("torrent has no tracker", "announce")))
    }

    /// Announce to a single tracker URL
    pub async fn announce_to(
        &self,
        tracker: &str,
        info: &TorrentInfo,
        peer_id: &[u8; 20],
        port: u16,
    ) -> Result<AnnounceResponse> {
        let url = announce_url(tracker, info, peer_id, port)?;
        info!("Announcing to tracker: {}", tracker);

        let body = self.transport.get(&url).await?;
        debug!("Tracker response: {} bytes", body.len());
        AnnounceResponse::from_bytes(&body)
    }
}

/// Build the announce URL, keeping any query the tracker URL already has
pub fn announce_url(tracker: &str, info: &TorrentInfo, peer_id: &[u8; 20], port: u16) -> Result<Url> {
    let mut url = Url::parse(tracker).map_err(|e| {
        TorrentError::config_error_with_field(format!("invalid tracker URL '{}': {}", tracker, e), "announce")
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TorrentError::config_error_with_field(
            format!("unsupported tracker scheme '{}'", url.scheme()),
            "announce",
        ));
    }

    let announce_query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded=0&downloaded=0&left={}&compact=1",
        urlencoding::encode_binary(&info.info_hash),
        urlencoding::encode_binary(peer_id),
        port,
        info.total_length
    );
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, announce_query),
        _ => announce_query,
    };
    url.set_query(Some(&query));
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{self, BencodeDict, BencodeValue};
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    /// Transport answering from a table of canned bodies
    #[derive(Default)]
    struct MockTransport {
        bodies: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<Url>>,
    }

    impl MockTransport {
        fn with(mut self, host: &str, body: Vec<u8>) -> Self {
            self.bodies.insert(host.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl TrackerTransport for MockTransport {
        async fn get(&self, url: &Url) -> Result<Vec<u8>> {
            self.requests.lock().unwrap().push(url.clone());
            let host = url.host_str().unwrap_or_default();
            self.bodies
                .get(host)
                .cloned()
                .ok_or_else(|| TorrentError::transport_error(format!("{} unreachable", host)))
        }
    }

    fn torrent(announce_list: Vec<&str>) -> TorrentInfo {
        TorrentInfo {
            announce: "http://primary.example/announce".to_string(),
            announce_list: announce_list.into_iter().map(String::from).collect(),
            name: "sample.txt".to_string(),
            piece_length: 32768,
            total_length: 92063,
            piece_hashes: vec![[0u8; 20]; 3],
            info_hash: [
                0xd6, 0x9f, 0x91, 0xe6, 0xb2, 0xae, 0x4c, 0x54, 0x24, 0x68, //
                0xd1, 0x07, 0x3a, 0x71, 0xd4, 0xea, 0x13, 0x87, 0x9a, 0x7f,
            ],
        }
    }

    fn peers_body(peers: &[u8]) -> Vec<u8> {
        let mut dict = BencodeDict::new();
        dict.insert(b"interval".to_vec(), BencodeValue::from(60i64));
        dict.insert(b"peers".to_vec(), BencodeValue::from(peers));
        bencode::encode(&BencodeValue::Dictionary(dict))
    }

    #[test]
    fn test_announce_url_query() {
        let info = torrent(vec![]);
        let url = announce_url(&info.announce, &info, b"-MB0001-abcdefghijkl", 6881).unwrap();

        assert_eq!(
            url.query(),
            Some(
                "info_hash=%D6%9F%91%E6%B2%AELT%24h%D1%07%3Aq%D4%EA%13%87%9A%7F\
                 &peer_id=-MB0001-abcdefghijkl&port=6881&uploaded=0&downloaded=0&left=92063&compact=1"
            )
        );
        assert_eq!(url.path(), "/announce");
    }

    #[test]
    fn test_announce_url_keeps_existing_query() {
        let info = torrent(vec![]);
        let url = announce_url("http://t.example/announce?passkey=abc", &info, &[b'a'; 20], 1).unwrap();
        let query = url.query().unwrap();
        assert!(query.starts_with("passkey=abc&info_hash="));
        assert!(query.ends_with("&compact=1"));
    }

    #[test]
    fn test_announce_url_rejects_bad_trackers() {
        let info = torrent(vec![]);
        assert!(matches!(
            announce_url("not a url", &info, &[0u8; 20], 6881),
            Err(TorrentError::ConfigError { .. })
        ));
        assert!(matches!(
            announce_url("udp://tracker.example:80", &info, &[0u8; 20], 6881),
            Err(TorrentError::ConfigError { .. })
        ));
    }

    #[tokio::test]
    async fn test_announce_returns_peers_in_order() {
        let transport = MockTransport::default()
            .with("primary.example", peers_body(&[10, 0, 0, 1, 0x1a, 0xe1, 10, 0, 0, 2, 0x1a, 0xe2]));
        let client = TrackerClient::new(transport);

        let peers = client.announce(&torrent(vec![]), &[1u8; 20], 6881).await.unwrap();
        assert_eq!(
            peers,
            vec![
                PeerAddress::new(Ipv4Addr::new(10, 0, 0, 1), 6881),
                PeerAddress::new(Ipv4Addr::new(10, 0, 0, 2), 6882),
            ]
        );

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].query().unwrap().contains("left=92063"));
    }

    #[tokio::test]
    async fn test_announce_falls_back_to_next_tracker() {
        let transport = MockTransport::default().with("backup.example", peers_body(&[10, 0, 0, 9, 0, 80]));
        let client = TrackerClient::new(transport);
        let info = torrent(vec!["http://primary.example/announce", "http://backup.example/announce"]);

        let response = client.announce_full(&info, &[1u8; 20], 6881).await.unwrap();
        assert_eq!(response.interval, Some(60));
        assert_eq!(response.peers, vec![PeerAddress::new(Ipv4Addr::new(10, 0, 0, 9), 80)]);
        assert_eq!(client.transport.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_announce_all_trackers_fail() {
        let client = TrackerClient::new(MockTransport::default());
        let result = client.announce(&torrent(vec![]), &[1u8; 20], 6881).await;
        assert!(matches!(result, Err(TorrentError::TransportError { .. })));
    }
}
