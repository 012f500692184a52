use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::session::Session;

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Send an authenticated request and decode a JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    session: &Session,
    request: RequestBuilder,
) -> Result<T> {
    let response = request
        .bearer_auth(session.bearer()?)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(service = session.service(), status = status.as_u16(), %body, "Request rejected");
        return Err(ClientError::Api {
            service: session.service(),
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Follow `@odata.nextLink` until the collection is exhausted.
pub(crate) async fn get_all<T: DeserializeOwned>(
    session: &Session,
    http: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut page: ListPage = send_json(session, http.get(url).query(query)).await?;
    loop {
        for value in page.value {
            items.push(serde_json::from_value(value)?);
        }
        match page.next_link {
            Some(next) => page = send_json(session, http.get(&next)).await?,
            None => break,
        }
    }
    Ok(items)
}

/// Pull `code: message` out of a Graph or ARM error envelope, falling back
/// to the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    let error = &parsed["error"];
    let message = error["message"]
        .as_str()
        .or_else(|| error["message"]["value"].as_str())
        .or_else(|| parsed["message"].as_str());
    match (error["code"].as_str(), message) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (None, Some(message)) => message.to_string(),
        _ => body.trim().to_string(),
    }
}

/// Quote a literal for an OData `$filter` expression.
pub(crate) fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
