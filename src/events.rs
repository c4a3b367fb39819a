//! Paginated access to the event log.

use crate::{Client, Error, Storage};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name of an inbound message kept in storage.
pub const EVENT_STORED: &str = "stored";

/// One entry of the event log.
///
/// Fields this crate does not model are kept in [`Event::extra`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    /// Event name, e.g. `delivered`, `failed` or `stored`.
    pub event: String,
    /// Unix time with fractional seconds.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.event
    }
}

/// Links to neighbouring pages, as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub first: String,
    #[serde(default)]
    pub next: String,
    #[serde(default)]
    pub previous: String,
    #[serde(default)]
    pub last: String,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    items: Vec<Event>,
    #[serde(default)]
    paging: Paging,
}

/// Filters for [`Client::list_events`].
#[derive(Debug, Clone, Default)]
pub struct ListEventsOptions {
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Oldest first when `true`.
    pub ascending: Option<bool>,
    /// Page size; the API caps it at 300.
    pub limit: Option<u32>,
    /// Filter expression on the event name, e.g. `delivered OR failed`.
    pub event: Option<String>,
}

impl ListEventsOptions {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(begin) = self.begin {
            query.push(("begin", begin.timestamp().to_string()));
        }
        if let Some(end) = self.end {
            query.push(("end", end.timestamp().to_string()));
        }
        if let Some(ascending) = self.ascending {
            query.push(("ascending", if ascending { "yes" } else { "no" }.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(event) = &self.event {
            query.push(("event", event.clone()));
        }
        query
    }
}

/// Lazy cursor over pages of events.
///
/// Each fetch returns `None` once a page comes back empty or a request
/// fails; [`EventIterator::err`] tells the two apart.
///
/// # Examples
/// ```no_run
/// # use mailgun_client::{Client, Config, ListEventsOptions};
/// # #[tokio::main]
/// # async fn main() -> Result<(), mailgun_client::Error> {
/// let client = Client::new(Config::new("mg.example.com", "key-123"))?;
/// let mut events = client.list_events(ListEventsOptions::default());
/// while let Some(page) = events.next().await {
///     for event in page {
///         println!("{} {}", event.timestamp, event.event);
///     }
/// }
/// if let Some(err) = events.err() {
///     eprintln!("listing stopped: {err}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct EventIterator {
    client: Client,
    paging: Paging,
    err: Option<Error>,
}

impl EventIterator {
    /// Fetch the next page.
    pub async fn next(&mut self) -> Option<Vec<Event>> {
        let link = self.paging.next.clone();
        self.fetch(link).await
    }

    /// Fetch the previous page.
    pub async fn previous(&mut self) -> Option<Vec<Event>> {
        let link = self.paging.previous.clone();
        self.fetch(link).await
    }

    /// Fetch the first page.
    pub async fn first(&mut self) -> Option<Vec<Event>> {
        let link = self.paging.first.clone();
        self.fetch(link).await
    }

    /// Fetch the last page.
    pub async fn last(&mut self) -> Option<Vec<Event>> {
        let link = self.paging.last.clone();
        self.fetch(link).await
    }

    /// Error that ended the iteration, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Current paging links.
    pub fn paging(&self) -> &Paging {
        &self.paging
    }

    async fn fetch(&mut self, link: String) -> Option<Vec<Event>> {
        if self.err.is_some() || link.is_empty() {
            return None;
        }
        let request = self.client.request(Method::GET, &link);
        match self.client.execute::<EventPage>(request).await {
            Ok(page) => {
                self.paging = page.paging;
                (!page.items.is_empty()).then_some(page.items)
            }
            Err(err) => {
                self.err = Some(err);
                None
            }
        }
    }
}

impl Client {
    /// Page through the event log of the client's domain.
    ///
    /// Nothing is fetched until the first call on the returned iterator.
    pub fn list_events(&self, options: ListEventsOptions) -> EventIterator {
        let mut start = self.url(&format!("{}/events", self.domain()));
        let query = options.query();
        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            start = format!("{start}?{encoded}");
        }

        EventIterator {
            client: self.clone(),
            paging: Paging {
                first: start.clone(),
                next: start,
                ..Paging::default()
            },
            err: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use chrono::TimeZone;

    #[test]
    fn query_only_carries_set_filters() {
        assert!(ListEventsOptions::default().query().is_empty());

        let options = ListEventsOptions {
            begin: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ascending: Some(true),
            limit: Some(25),
            event: Some("stored".into()),
            ..Default::default()
        };
        assert_eq!(
            options.query(),
            vec![
                ("begin", "1704067200".to_string()),
                ("ascending", "yes".to_string()),
                ("limit", "25".to_string()),
                ("event", "stored".to_string()),
            ]
        );
    }

    #[test]
    fn iterator_starts_at_events_endpoint() {
        let client = Client::new(Config::new("testDomain", "key").with_api_base("http://localhost/v3"))
            .unwrap();
        let it = client.list_events(ListEventsOptions {
            limit: Some(10),
            ..Default::default()
        });
        assert_eq!(it.paging().next, "http://localhost/v3/testDomain/events?limit=10");
        assert_eq!(it.paging().first, it.paging().next);
        assert!(it.err().is_none());
    }

    #[test]
    fn stored_event_exposes_storage_key() {
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "event": "stored",
            "timestamp": 1521233123.501324,
            "storage": {"key": "AgEFB...", "url": "https://se.api.mailgun.net/v3/domains/x/messages/AgEFB..."},
            "recipient": "bob@example.com"
        }))
        .unwrap();

        assert_eq!(event.name(), EVENT_STORED);
        assert_eq!(event.storage.unwrap().key, "AgEFB...");
        assert_eq!(event.extra["recipient"], "bob@example.com");
    }
}
