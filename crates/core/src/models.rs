use crate::error::SearchFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoFilter {
    pub center: GeoPoint,
    pub radius_meters: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntentKind {
    Fresh,
    LoadMore,
}

/// What the caller wants to see: free text, filters, an optional geo radius
/// and the page window.
///
/// A fresh intent always targets page 0; only [`SearchIntent::next_page`]
/// produces a load-more intent with a non-zero page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchIntent {
    query: String,
    districts: BTreeSet<String>,
    keywords: BTreeSet<String>,
    geo: Option<GeoFilter>,
    page_index: u32,
    page_size: Option<u32>,
    kind: IntentKind,
}

impl SearchIntent {
    pub fn fresh(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            districts: BTreeSet::new(),
            keywords: BTreeSet::new(),
            geo: None,
            page_index: 0,
            page_size: None,
            kind: IntentKind::Fresh,
        }
    }

    pub fn with_districts<I, S>(mut self, districts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.districts.extend(districts.into_iter().map(Into::into));
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    pub fn with_geo(mut self, center: GeoPoint, radius_meters: u32) -> Self {
        self.geo = Some(GeoFilter {
            center,
            radius_meters,
        });
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Same filters, continuing at `page_index` and appending to what is
    /// already shown.
    pub fn next_page(&self, page_index: u32) -> Self {
        Self {
            page_index,
            kind: IntentKind::LoadMore,
            ..self.clone()
        }
    }

    /// Back to page 0, replacing whatever the previous session accumulated.
    pub fn restart(&self) -> Self {
        Self {
            page_index: 0,
            kind: IntentKind::Fresh,
            ..self.clone()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn districts(&self) -> &BTreeSet<String> {
        &self.districts
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn geo(&self) -> Option<&GeoFilter> {
        self.geo.as_ref()
    }

    pub fn page_index(&self) -> u32 {
        match self.kind {
            IntentKind::Fresh => 0,
            IntentKind::LoadMore => self.page_index,
        }
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn is_fresh(&self) -> bool {
        self.kind == IntentKind::Fresh
    }
}

/// Cursor rule shared by pages and aggregate snapshots.
pub fn next_page_index(current_page: u32, total_pages: u32) -> Option<u32> {
    if total_pages > 0 && current_page < total_pages - 1 {
        Some(current_page + 1)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchPage<R> {
    pub records: Vec<R>,
    pub page_index: u32,
    pub next_page_index: Option<u32>,
    pub total_hits: u64,
    pub total_pages: u32,
    pub fetched_at: DateTime<Utc>,
}

impl<R> SearchPage<R> {
    pub fn new(records: Vec<R>, page_index: u32, total_hits: u64, total_pages: u32) -> Self {
        Self {
            records,
            page_index,
            next_page_index: next_page_index(page_index, total_pages),
            total_hits,
            total_pages,
            fetched_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchPhase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error(SearchFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateState<R> {
    pub records: Vec<R>,
    pub total_hits: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub phase: SearchPhase,
}

impl<R> Default for AggregateState<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            total_hits: 0,
            current_page: 0,
            total_pages: 0,
            phase: SearchPhase::Idle,
        }
    }
}

impl<R> AggregateState<R> {
    pub fn is_loading(&self) -> bool {
        self.phase == SearchPhase::Loading
    }

    pub fn last_error(&self) -> Option<&SearchFailure> {
        match &self.phase {
            SearchPhase::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// Only meaningful once a page has been applied; idle, loading-fresh and
    /// failed-fresh states have zero total pages and therefore no cursor.
    pub fn next_page_index(&self) -> Option<u32> {
        next_page_index(self.current_page, self.total_pages)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        self.records.clear();
        self.total_hits = 0;
        self.current_page = 0;
        self.total_pages = 0;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(rename = "_geoloc", default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub default_page_size: u32,
    pub channel_capacity: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            channel_capacity: 64,
        }
    }
}
