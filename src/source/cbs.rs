//! CBS open-data OData client.
//!
//! Data rows come from the bulk feed (`ODataFeed`), which pages through
//! `odata.nextLink`. The untyped data set is read unless `typed` is set, so
//! cells land as the text CBS publishes. Dimension code lists come from the regular API
//! (`ODataApi`) and are used to swap codes for their titles.

use super::TableSource;
use crate::config::SourceConfig;
use crate::error::{IngestError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

const DIMENSION_TYPES: [&str; 3] = ["Dimension", "GeoDimension", "TimeDimension"];

#[derive(Debug, Deserialize)]
struct ODataPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataProperty {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DimensionEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Title")]
    title: Option<String>,
}

pub struct CbsClient {
    client: reqwest::Client,
    name: String,
    api_url: String,
    feed_url: String,
    data_set: &'static str,
    resolve_dimensions: bool,
}

impl CbsClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            name: config.name.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            feed_url: config.feed_url.trim_end_matches('/').to_string(),
            data_set: if config.typed { "TypedDataSet" } else { "UntypedDataSet" },
            resolve_dimensions: config.resolve_dimensions,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {}", url);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::Api {
                message: format!("{} returned status {}", url, status.as_u16()),
            });
        }
        Ok(resp.json::<T>().await?)
    }

    /// Follow `odata.nextLink` from `url` and concatenate every page
    async fn get_all_pages(&self, url: String) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;
        while let Some(url) = next {
            let page: ODataPage = self.get_json(&url).await?;
            pages += 1;
            records.extend(page.value);
            next = page.next_link;
        }
        debug!("Fetched {} records over {} page(s)", records.len(), pages);
        Ok(records)
    }

    async fn dimension_titles(&self, table_name: &str) -> Result<HashMap<String, HashMap<String, String>>> {
        let url = format!("{}/{}/DataProperties?$format=json", self.api_url, table_name);
        let properties: Vec<DataProperty> = self
            .get_all_pages(url)
            .await?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;

        let mut dimensions = HashMap::new();
        for property in properties {
            let is_dimension = property
                .kind
                .as_deref()
                .is_some_and(|k| DIMENSION_TYPES.contains(&k));
            let Some(key) = property.key.filter(|_| is_dimension) else {
                continue;
            };
            let url = format!("{}/{}/{}?$format=json", self.api_url, table_name, key);
            let entries: Vec<DimensionEntry> = self
                .get_all_pages(url)
                .await?
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<_, _>>()?;
            let titles = entries
                .into_iter()
                .filter_map(|e| e.title.map(|t| (e.key, t)))
                .collect();
            dimensions.insert(key, titles);
        }
        Ok(dimensions)
    }
}

/// Replace dimension codes with titles; unknown codes are kept as-is
fn decode_dimensions(records: &mut [Value], dimensions: &HashMap<String, HashMap<String, String>>) {
    for record in records.iter_mut() {
        let Some(obj) = record.as_object_mut() else {
            continue;
        };
        for (column, titles) in dimensions {
            if let Some(Value::String(code)) = obj.get_mut(column) {
                let title = titles.get(code.as_str()).or_else(|| titles.get(code.trim()));
                if let Some(title) = title {
                    *code = title.clone();
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl TableSource for CbsClient {
    fn source_name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self))]
    async fn fetch_table(&self, table_name: &str) -> Result<Vec<Value>> {
        let url = format!("{}/{}/{}?$format=json", self.feed_url, table_name, self.data_set);
        let mut records = self.get_all_pages(url).await?;

        if self.resolve_dimensions && !records.is_empty() {
            let dimensions = self.dimension_titles(table_name).await?;
            decode_dimensions(&mut records, &dimensions);
            info!("Decoded {} dimension column(s) for {}", dimensions.len(), table_name);
        }
        Ok(records)
    }
}
