use std::collections::BTreeMap;

use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{SearchHit, VectorBackend};
use crate::config::{BackendConfig, CLASS_NAME, ClassSchema};
use crate::error::{Error, RemoteOp, Result};
use crate::image::ImageRecord;

/// Weaviate client speaking the REST and GraphQL APIs
#[derive(Debug, Clone)]
pub struct WeaviateBackend {
    client: Client,
    base: Url,
    schema: ClassSchema,
}

#[derive(Deserialize)]
struct SchemaResponse {
    classes: Option<Vec<SchemaClass>>,
}

#[derive(Deserialize)]
struct SchemaClass {
    class: Option<String>,
}

#[derive(Deserialize)]
struct ObjectResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn error_message(&self) -> Option<String> {
        let errors = self.errors.as_ref().filter(|e| !e.is_empty())?;
        Some(errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))
    }
}

#[derive(Deserialize)]
struct GetData {
    #[serde(rename = "Get")]
    get: Option<BTreeMap<String, Option<Vec<ImageObject>>>>,
}

#[derive(Deserialize)]
struct ImageObject {
    image: Option<String>,
    text: Option<String>,
    #[serde(rename = "_additional")]
    additional: Option<Additional>,
}

#[derive(Deserialize)]
struct Additional {
    id: Option<String>,
    certainty: Option<f64>,
    distance: Option<f64>,
}

#[derive(Deserialize)]
struct AggregateData {
    #[serde(rename = "Aggregate")]
    aggregate: Option<BTreeMap<String, Vec<AggregateGroup>>>,
}

#[derive(Deserialize)]
struct AggregateGroup {
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    count: Option<u64>,
}

impl WeaviateBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url())
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", config.base_url(), e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!("not a base url: {}", base)));
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::InvalidConfig(format!("header {}: {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::InvalidConfig(format!("header {}: {}", key, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(Self { client, base, schema: ClassSchema::image() })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        op: RemoteOp,
        query: String,
    ) -> Result<GraphQlResponse<T>> {
        let response = self
            .client
            .post(self.endpoint(&["v1", "graphql"]))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| Error::remote(op, e))?;
        parse(op, response).await
    }
}

/// Turn non-2xx statuses into errors, keeping the body for context
async fn check(op: RemoteOp, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::remote(op, format!("{}: {}", status, body.trim())))
}

async fn parse<T: DeserializeOwned>(op: RemoteOp, response: Response) -> Result<T> {
    check(op, response).await?.json().await.map_err(|e| Error::remote(op, e))
}

/// Whether a GraphQL error only says the image class is not in the schema
fn is_missing_class(message: &str) -> bool {
    message.contains(&format!("Cannot query field \"{}\"", CLASS_NAME))
}

fn into_hit(object: ImageObject) -> Result<SearchHit> {
    let additional = object.additional.unwrap_or(Additional { id: None, certainty: None, distance: None });
    let id = additional.id.ok_or_else(|| Error::remote(RemoteOp::Query, "object without id"))?;
    let encoded_image = object
        .image
        .ok_or_else(|| Error::remote(RemoteOp::Query, format!("object {} without image", id)))?;
    // cosine distance lies in [0, 2]
    let similarity = additional
        .certainty
        .or(additional.distance.map(|d| 1. - d / 2.))
        .unwrap_or(0.)
        .clamp(0., 1.) as f32;
    Ok(SearchHit { id, encoded_image, text: object.text, similarity })
}

impl VectorBackend for WeaviateBackend {
    async fn connect(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint(&["v1", ".well-known", "ready"]))
            .send()
            .await
            .map_err(|e| Error::remote(RemoteOp::Connect, e))?;
        check(RemoteOp::Connect, response).await?;
        debug!("connected to {}", self.base);
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        let op = RemoteOp::Schema;
        let url = self.endpoint(&["v1", "schema"]);
        let response = self.client.get(url.clone()).send().await.map_err(|e| Error::remote(op, e))?;
        let existing: SchemaResponse = parse(op, response).await?;

        let exists = existing
            .classes
            .unwrap_or_default()
            .iter()
            .any(|c| c.class.as_deref() == Some(self.schema.class));
        if exists {
            info!("schema for class {} already exists", self.schema.class);
            return Ok(());
        }

        let response =
            self.client.post(url).json(&self.schema).send().await.map_err(|e| Error::remote(op, e))?;
        // another client may create the class between the two requests
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response.text().await.unwrap_or_default();
            if body.contains("already exists") {
                info!("schema for class {} already exists", self.schema.class);
                return Ok(());
            }
            return Err(Error::remote(op, format!("{}: {}", StatusCode::UNPROCESSABLE_ENTITY, body.trim())));
        }
        check(op, response).await?;
        info!("created schema for class {}", self.schema.class);
        Ok(())
    }

    async fn insert(&self, image: &ImageRecord) -> Result<String> {
        let op = RemoteOp::Insert;
        let body = json!({
            "class": CLASS_NAME,
            "properties": {
                "image": image.encoded(),
                "text": image.filename(),
            },
        });
        let response = self
            .client
            .post(self.endpoint(&["v1", "objects"]))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::remote(op, e))?;
        let created: ObjectResponse = parse(op, response).await?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::remote(op, "failed to get ID from created object"))
    }

    async fn query(
        &self,
        image: &ImageRecord,
        limit: usize,
        offset: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        // base64 never needs escaping inside a GraphQL string
        let mut args = format!("nearImage: {{image: \"{}\"}}, limit: {}", image.encoded(), limit);
        if let Some(offset) = offset {
            args.push_str(&format!(", offset: {}", offset));
        }
        let query = format!(
            "{{ Get {{ {}({}) {{ image text _additional {{ id certainty distance }} }} }} }}",
            CLASS_NAME, args
        );

        let mut response: GraphQlResponse<GetData> = self.graphql(RemoteOp::Query, query).await?;
        let error = response.error_message();
        let objects = response
            .data
            .take()
            .and_then(|data| data.get)
            .and_then(|mut get| get.remove(CLASS_NAME))
            .flatten();

        match (objects, error) {
            (Some(objects), _) => objects.into_iter().map(into_hit).collect(),
            (None, Some(error)) if is_missing_class(&error) => {
                debug!("class {} does not exist yet", CLASS_NAME);
                Ok(vec![])
            }
            (None, Some(error)) => Err(Error::remote(RemoteOp::Query, error)),
            (None, None) => Ok(vec![]),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let op = RemoteOp::Delete;
        let response = self
            .client
            .delete(self.endpoint(&["v1", "objects", CLASS_NAME, id]))
            .send()
            .await
            .map_err(|e| Error::remote(op, e))?;
        check(op, response).await?;
        Ok(true)
    }

    async fn count(&self) -> Result<u64> {
        let op = RemoteOp::Count;
        let query = format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", CLASS_NAME);
        let response: GraphQlResponse<AggregateData> = self.graphql(op, query).await?;
        if let Some(error) = response.error_message() {
            return Err(Error::remote(op, error));
        }
        response
            .data
            .and_then(|data| data.aggregate)
            .and_then(|mut aggregate| aggregate.remove(CLASS_NAME))
            .and_then(|groups| groups.into_iter().next())
            .and_then(|group| group.meta)
            .and_then(|meta| meta.count)
            .ok_or_else(|| Error::remote(op, "missing count in response"))
    }
}
