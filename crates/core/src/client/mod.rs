use crate::{config::ChannelConfig, BandEvent, BandLevels, EventSource};

/// Status-query consumer: answers "what are the levels right now".
///
/// Every query polls the source; when nothing new arrived the last event
/// seen is answered again, so back-to-back queries agree with each other.
#[derive(Debug)]
pub struct QueryClient {
    source: EventSource,
    last_event: Option<BandEvent>,
}

impl QueryClient {
    pub fn new(config: &ChannelConfig) -> Self {
        Self::from_source(EventSource::new(config))
    }

    pub fn from_source(source: EventSource) -> Self {
        Self {
            source,
            last_event: None,
        }
    }

    /// True when the daemon's shared region could be opened.
    pub fn is_available(&self) -> bool {
        self.source.is_available()
    }

    /// Latest band levels, or `None` if no event has ever been seen.
    pub fn bands(&mut self) -> Option<BandLevels> {
        self.refresh();
        self.last_event.as_ref().map(|event| event.bands)
    }

    /// Level of one band by wire name (`total` included); 0.0 when unknown
    /// or unavailable.
    pub fn band(&mut self, name: &str) -> f32 {
        self.bands()
            .and_then(|bands| bands.by_name(name))
            .unwrap_or(0.0)
    }

    pub fn total_energy(&mut self) -> f32 {
        self.bands().map(|bands| bands.total).unwrap_or(0.0)
    }

    /// Timestamp of the last event seen.
    pub fn timestamp(&self) -> Option<f64> {
        self.last_event.as_ref().and_then(|event| event.timestamp)
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    fn refresh(&mut self) {
        if let Some(event) = self.source.poll() {
            self.last_event = Some(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BandLevels, EventSink};

    #[test]
    fn answers_from_the_latest_event() {
        let dir = tempfile::tempdir().unwrap();
        let shm = dir.path().join("region");
        let file = dir.path().join("last_event.json");
        let mut sink = EventSink::with_paths(&shm, &file);
        let mut client = QueryClient::from_source(EventSource::with_paths(&shm, &file));

        assert!(client.is_available());
        assert_eq!(client.bands(), None);
        assert_eq!(client.band("bass"), 0.0);
        assert_eq!(client.timestamp(), None);

        sink.publish(&BandEvent::from_levels(BandLevels {
            bass: 0.73,
            total: 0.5,
            ..Default::default()
        }));

        assert_eq!(client.band("bass"), 0.73);
        assert_eq!(client.band("total"), 0.5);
        assert_eq!(client.total_energy(), 0.5);
        assert_eq!(client.band("presence"), 0.0);
        assert!(client.timestamp().is_some());
    }

    #[test]
    fn unavailable_daemon_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("last_event.json");
        let mut client =
            QueryClient::from_source(EventSource::with_paths(dir.path().join("region"), &file));

        assert!(!client.is_available());
        assert_eq!(client.source().active_path(), file);
        assert_eq!(client.bands(), None);
        assert_eq!(client.total_energy(), 0.0);
        assert_eq!(client.source().stats().polls, 2);
    }
}
