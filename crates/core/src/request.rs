use crate::models::SearchIntent;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

const FILTER_SEPARATOR: &str = ",";

/// Transport-ready encoding of a [`SearchIntent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SearchDescriptor {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub districts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub keywords: Option<String>,
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub around_lat_lng: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub around_radius: Option<u32>,
}

impl SearchDescriptor {
    pub fn to_query_params(&self) -> String {
        let mut params = form_urlencoded::Serializer::new(String::new());

        if let Some(query) = &self.query {
            params.append_pair("query", query);
        }
        if let Some(districts) = &self.districts {
            params.append_pair("districts", districts);
        }
        if let Some(keywords) = &self.keywords {
            params.append_pair("keywords", keywords);
        }
        params.append_pair("page", &self.page.to_string());
        params.append_pair("pageSize", &self.page_size.to_string());
        if let (Some(lat_lng), Some(radius)) = (&self.around_lat_lng, self.around_radius) {
            params.append_pair("aroundLatLng", lat_lng);
            params.append_pair("aroundRadius", &radius.to_string());
        }

        params.finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder {
    default_page_size: u32,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new(crate::SearchSettings::default().default_page_size)
    }
}

impl RequestBuilder {
    pub fn new(default_page_size: u32) -> Self {
        Self { default_page_size }
    }

    pub fn build(&self, intent: &SearchIntent) -> SearchDescriptor {
        let query = Some(intent.query())
            .filter(|query| !query.trim().is_empty())
            .map(str::to_string);

        let (around_lat_lng, around_radius) = match intent.geo() {
            Some(geo) => (
                Some(format!("{},{}", geo.center.lat, geo.center.lng)),
                Some(geo.radius_meters),
            ),
            None => (None, None),
        };

        SearchDescriptor {
            query,
            districts: join_codes(intent.districts()),
            keywords: join_codes(intent.keywords()),
            page: intent.page_index(),
            page_size: intent.page_size().unwrap_or(self.default_page_size),
            around_lat_lng,
            around_radius,
        }
    }
}

fn join_codes<'a>(codes: impl IntoIterator<Item = &'a String>) -> Option<String> {
    let joined = codes
        .into_iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty())
        .collect::<Vec<_>>()
        .join(FILTER_SEPARATOR);

    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;

    #[test]
    fn empty_filters_are_omitted() {
        let descriptor = RequestBuilder::new(20).build(&SearchIntent::fresh("   "));

        assert_eq!(descriptor.query, None);
        assert_eq!(descriptor.districts, None);
        assert_eq!(descriptor.keywords, None);
        assert_eq!(descriptor.around_lat_lng, None);
        assert_eq!(descriptor.around_radius, None);
        assert_eq!(descriptor.page, 0);
        assert_eq!(descriptor.page_size, 20);

        let wire = serde_json::to_value(&descriptor).expect("descriptor serializes");
        assert_eq!(wire, serde_json::json!({"page": 0, "pageSize": 20}));
    }

    #[test]
    fn non_blank_query_is_emitted_verbatim() {
        let descriptor = RequestBuilder::default().build(&SearchIntent::fresh(" dim sum "));
        assert_eq!(descriptor.query.as_deref(), Some(" dim sum "));
    }

    #[test]
    fn multi_valued_filters_join_with_comma() {
        let intent = SearchIntent::fresh("vegan")
            .with_districts(["Central", "Admiralty"])
            .with_keywords(["noodles", "", "dessert"]);
        let descriptor = RequestBuilder::default().build(&intent);

        assert_eq!(descriptor.districts.as_deref(), Some("Admiralty,Central"));
        assert_eq!(descriptor.keywords.as_deref(), Some("dessert,noodles"));
    }

    #[test]
    fn geo_emits_center_and_radius_together() {
        let intent = SearchIntent::fresh("")
            .with_geo(GeoPoint::new(22.2819, 114.1582), 1500)
            .with_page_size(5)
            .next_page(2);
        let descriptor = RequestBuilder::default().build(&intent);

        assert_eq!(descriptor.around_lat_lng.as_deref(), Some("22.2819,114.1582"));
        assert_eq!(descriptor.around_radius, Some(1500));
        assert_eq!(descriptor.page, 2);
        assert_eq!(descriptor.page_size, 5);
    }

    #[test]
    fn build_is_deterministic() {
        let intent = SearchIntent::fresh("sushi").with_keywords(["b", "a"]);
        let builder = RequestBuilder::default();
        assert_eq!(builder.build(&intent), builder.build(&intent));
    }

    #[test]
    fn query_params_are_url_encoded() {
        let intent = SearchIntent::fresh("fish & chips")
            .with_districts(["Central"])
            .with_geo(GeoPoint::new(1.5, 2.5), 300);
        let params = RequestBuilder::new(10).build(&intent).to_query_params();

        assert_eq!(
            params,
            "query=fish+%26+chips&districts=Central&page=0&pageSize=10&aroundLatLng=1.5%2C2.5&aroundRadius=300"
        );
    }
}
