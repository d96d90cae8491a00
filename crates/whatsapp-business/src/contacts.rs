//! Provider-side contact records.

use std::{collections::BTreeMap, sync::Arc};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    tracing::debug,
};

use crate::{
    auth::TokenManager,
    channel::id_string,
    error::{Error, Result},
    phone::PhoneNormalizer,
    transport::{ApiRequest, ApiResponse, HttpTransport},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Contact {
    #[must_use]
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Default::default()
        }
    }
}

/// Create, update and look up contacts on the provider.
pub struct ContactDirectory {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenManager,
    base_url: String,
    normalizer: PhoneNormalizer,
}

impl ContactDirectory {
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        tokens: TokenManager,
        base_url: impl Into<String>,
        normalizer: PhoneNormalizer,
    ) -> Self {
        Self {
            transport,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            normalizer,
        }
    }

    /// Upsert by phone. Returns the provider's record, or the submitted one
    /// (with normalized phone) when the response carries none.
    pub async fn create_or_update(&self, contact: &Contact) -> Result<Contact> {
        let phone = self.normalized(&contact.phone)?;
        let body = json!({
            "phone": phone,
            "name": contact.name,
            "variables": contact.variables,
            "tags": contact.tags,
        });
        let token = self.tokens.access_token().await?;
        let response = self
            .transport
            .execute(ApiRequest::post(format!("{}/contacts", self.base_url), body).bearer(token))
            .await?;
        self.check_status(&response).await?;

        let submitted = Contact {
            phone,
            ..contact.clone()
        };
        let saved = response
            .json()
            .ok()
            .and_then(|body| contact_from_value(&body))
            .unwrap_or(submitted);
        debug!(contact_id = saved.id.as_deref().unwrap_or_default(), "contact saved");
        Ok(saved)
    }

    /// Look up by phone. `None` when the provider does not know it.
    pub async fn get(&self, phone: &str) -> Result<Option<Contact>> {
        let phone = self.normalized(phone)?;
        let token = self.tokens.access_token().await?;
        let response = self
            .transport
            .execute(
                ApiRequest::get(format!("{}/contacts/getByPhone", self.base_url))
                    .query("phone", phone.as_str())
                    .bearer(token),
            )
            .await?;
        if response.status == 404 {
            return Ok(None);
        }
        self.check_status(&response).await?;
        Ok(contact_from_value(&response.json()?))
    }

    fn normalized(&self, raw: &str) -> Result<String> {
        let phone = self.normalizer.normalize(raw);
        if phone.is_empty() {
            return Err(Error::invalid_message(format!(
                "phone \"{raw}\" contains no digits"
            )));
        }
        Ok(phone)
    }

    async fn check_status(&self, response: &ApiResponse) -> Result<()> {
        match response.status {
            _ if response.is_success() => Ok(()),
            401 | 403 => {
                if response.status == 401 {
                    self.tokens.invalidate().await;
                }
                Err(Error::Authentication(response.provider_message()))
            },
            status => Err(Error::Request {
                status,
                message: response.provider_message(),
            }),
        }
    }
}

/// Lenient parse of `{data: {...}}` or a bare contact object.
fn contact_from_value(body: &Value) -> Option<Contact> {
    let object = match body.get("data") {
        Some(data) if data.is_object() => data,
        Some(_) => return None,
        None if body.get("phone").is_some() => body,
        None => return None,
    };
    let phone = object.get("phone").and_then(id_string)?;
    let variables = object
        .get("variables")
        .and_then(Value::as_object)
        .map(|vars| {
            vars.iter()
                .map(|(k, v)| {
                    let v = v.as_str().map_or_else(|| v.to_string(), String::from);
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default();
    let tags = object
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    Some(Contact {
        id: object
            .get("id")
            .or_else(|| object.get("_id"))
            .and_then(id_string),
        phone,
        name: object.get("name").and_then(Value::as_str).map(String::from),
        variables,
        tags,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::transport::ReqwestTransport,
        secrecy::Secret,
        std::time::Duration,
    };

    async fn directory(server: &mut mockito::Server) -> (ContactDirectory, mockito::Mock) {
        let token = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":3600}"#)
            .create_async()
            .await;
        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap(),
        );
        let tokens = TokenManager::new(
            Arc::clone(&transport),
            format!("{}/oauth/token", server.url()),
            "app",
            Secret::new("secret".into()),
        )
        .unwrap();
        let directory =
            ContactDirectory::new(transport, tokens, server.url(), PhoneNormalizer::default());
        (directory, token)
    }

    #[tokio::test]
    async fn get_unknown_phone_returns_none() {
        let mut server = mockito::Server::new_async().await;
        let (directory, _token) = directory(&mut server).await;
        let mock = server
            .mock("GET", "/contacts/getByPhone")
            .match_query(mockito::Matcher::UrlEncoded(
                "phone".into(),
                "5533999898026".into(),
            ))
            .with_status(404)
            .with_body(r#"{"message":"contact not found"}"#)
            .create_async()
            .await;

        assert_eq!(directory.get("(33) 99989-8026").await.unwrap(), None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_parses_data_object() {
        let mut server = mockito::Server::new_async().await;
        let (directory, _token) = directory(&mut server).await;
        let _mock = server
            .mock("GET", "/contacts/getByPhone")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"success": true, "data": {
                    "id": 77,
                    "phone": "5533999898026",
                    "name": "Ana",
                    "variables": {"plan": "gold", "visits": 3},
                    "tags": ["vip", 1],
                }})
                .to_string(),
            )
            .create_async()
            .await;

        let contact = directory.get("5533999898026").await.unwrap().unwrap();
        assert_eq!(contact.id.as_deref(), Some("77"));
        assert_eq!(contact.name.as_deref(), Some("Ana"));
        assert_eq!(contact.variables["plan"], "gold");
        assert_eq!(contact.variables["visits"], "3");
        assert_eq!(contact.tags, vec!["vip".to_string()]);
    }

    #[tokio::test]
    async fn upsert_sends_normalized_phone_and_falls_back_to_request() {
        let mut server = mockito::Server::new_async().await;
        let (directory, _token) = directory(&mut server).await;
        let mock = server
            .mock("POST", "/contacts")
            .match_header("authorization", "Bearer tok")
            .match_body(mockito::Matcher::Json(json!({
                "phone": "5533999898026",
                "name": "Ana",
                "variables": {"plan": "gold"},
                "tags": ["vip"],
            })))
            .with_status(201)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let mut contact = Contact::new("+55 (33) 99989-8026");
        contact.name = Some("Ana".into());
        contact.variables.insert("plan".into(), "gold".into());
        contact.tags.push("vip".into());

        let saved = directory.create_or_update(&contact).await.unwrap();
        mock.assert_async().await;
        assert_eq!(saved.phone, "5533999898026");
        assert_eq!(saved.name.as_deref(), Some("Ana"));
        assert_eq!(saved.id, None);
    }

    #[tokio::test]
    async fn upsert_error_surfaces_provider_message() {
        let mut server = mockito::Server::new_async().await;
        let (directory, _token) = directory(&mut server).await;
        let _mock = server
            .mock("POST", "/contacts")
            .with_status(422)
            .with_body(r#"{"error":{"message":"invalid tag"}}"#)
            .create_async()
            .await;

        let err = directory
            .create_or_update(&Contact::new("33999898026"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Request { status: 422, ref message } if message == "invalid tag"
        ));
    }

    #[tokio::test]
    async fn phone_without_digits_is_rejected_without_io() {
        let mut server = mockito::Server::new_async().await;
        let (directory, _token) = directory(&mut server).await;
        assert!(matches!(
            directory.get("n/a").await,
            Err(Error::InvalidMessage(_))
        ));
    }
}
