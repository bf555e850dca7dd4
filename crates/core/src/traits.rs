use crate::error::Result;
use crate::{GeoPoint, SearchDescriptor, SearchFailure, SearchIntent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// One page as reported by the search server, before record decoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchResponse {
    pub hits: Vec<Value>,
    pub page: u32,
    pub nb_hits: u64,
    pub nb_pages: u32,
}

#[async_trait]
pub trait SearchTransport {
    async fn fetch(&self, descriptor: &SearchDescriptor) -> Result<RawSearchResponse>;
}

pub trait RecordDecoder {
    type Record;

    fn decode(&self, raw: &Value) -> Result<Self::Record>;
}

/// Decodes hits straight through serde.
pub struct JsonRecordDecoder<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for JsonRecordDecoder<T> {
    fn default() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> RecordDecoder for JsonRecordDecoder<T> {
    type Record = T;

    fn decode(&self, raw: &Value) -> Result<T> {
        T::deserialize(raw).map_err(SearchFailure::from)
    }
}

#[async_trait]
pub trait GeoProvider {
    async fn locate(&self) -> Result<GeoPoint>;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoPoint);

#[async_trait]
impl GeoProvider for FixedLocation {
    async fn locate(&self) -> Result<GeoPoint> {
        Ok(self.0)
    }
}

pub async fn nearby_intent<P>(
    provider: &P,
    query: impl Into<String>,
    radius_meters: u32,
) -> Result<SearchIntent>
where
    P: GeoProvider + Sync + ?Sized,
{
    let center = provider.locate().await?;
    Ok(SearchIntent::fresh(query).with_geo(center, radius_meters))
}
