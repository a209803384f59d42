use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use reqwest::{
    Client as ReqwestClient, Method,
    header::{HeaderMap, HeaderValue},
};
use url::Url;

use super::types::{
    CreateSubscriptionRequest, SubscriptionRecord, SubscriptionsPage, SubscriptionsRequest,
};
use crate::auth::Credentials;
use crate::error::Error;
use crate::eventsub::registration::SubscriptionApi;
use crate::{HELIX_HOST, Result, ToQueryParams as _};

const SUBSCRIPTIONS_PATH: &str = "eventsub/subscriptions";

/// Client for the Helix EventSub subscription endpoints.
///
/// Every request carries the `Client-Id` and bearer token of the [`Credentials`].
///
/// # Example
///
/// ```no_run
/// use eventsub_client::auth::Credentials;
/// use eventsub_client::helix::{Client, types::SubscriptionsRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let credentials = Credentials::new("client-id".to_owned(), "user-token".to_owned());
/// let client = Client::with_credentials(credentials)?;
///
/// let page = client.subscriptions(&SubscriptionsRequest::default(), None).await?;
/// println!("{} subscriptions, cost {}/{}", page.total, page.total_cost, page.max_total_cost);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    host: Url,
    client: ReqwestClient,
    credentials: Credentials,
}

impl Client {
    /// Creates a new Helix client against a custom host, e.g. a mock server.
    ///
    /// # Errors
    ///
    /// Returns an error if the host URL is invalid or the HTTP client fails to build.
    pub fn new(host: &str, credentials: Credentials) -> Result<Client> {
        let mut headers = HeaderMap::new();

        headers.insert("User-Agent", HeaderValue::from_static("eventsub_client"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Ok(Self {
            host: Url::parse(host)?,
            client,
            credentials,
        })
    }

    /// Creates a new Helix client against `https://api.twitch.tv/helix/`.
    pub fn with_credentials(credentials: Credentials) -> Result<Client> {
        Self::new(HELIX_HOST, credentials)
    }

    /// Returns the host URL for the client.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn endpoint(&self) -> String {
        format!("{}{SUBSCRIPTIONS_PATH}", self.host())
    }

    /// Create an EventSub subscription.
    ///
    /// Rate limiting surfaces as [`crate::error::Kind::RateLimited`], rejected credentials as
    /// [`crate::error::Kind::Unauthorized`] and every other failure status as
    /// [`crate::error::Kind::Status`].
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<SubscriptionRecord> {
        let request = self
            .client
            .request(Method::POST, self.endpoint())
            .json(request)
            .build()?;

        let page: SubscriptionsPage =
            crate::request(&self.client, request, Some(self.credentials.headers()?)).await?;

        page.data
            .into_iter()
            .next()
            .ok_or_else(|| Error::validation("Helix accepted the subscription but returned no data"))
    }

    /// Delete an EventSub subscription by its id.
    pub async fn delete_subscription(&self, id: &str) -> Result<()> {
        let request = self
            .client
            .request(Method::DELETE, self.endpoint())
            .query(&[("id", id)])
            .build()?;

        crate::request(&self.client, request, Some(self.credentials.headers()?)).await
    }

    /// Fetch one page of subscriptions. Pass the previous page's cursor as `after`.
    pub async fn subscriptions(
        &self,
        request: &SubscriptionsRequest,
        after: Option<String>,
    ) -> Result<SubscriptionsPage> {
        let query = request.query_params(after.as_deref());
        let request = self
            .client
            .request(Method::GET, format!("{}{query}", self.endpoint()))
            .build()?;

        crate::request(&self.client, request, Some(self.credentials.headers()?)).await
    }

    /// Stream every subscription matching `request`, following the pagination cursor.
    pub fn stream_subscriptions<'client>(
        &'client self,
        request: &'client SubscriptionsRequest,
    ) -> impl Stream<Item = Result<SubscriptionRecord>> + 'client {
        try_stream! {
            let mut after: Option<String> = None;

            loop {
                let page = self.subscriptions(request, after.take()).await?;

                for record in page.data {
                    yield record;
                }

                match page.pagination.cursor {
                    Some(cursor) if !cursor.is_empty() => after = Some(cursor),
                    _ => break,
                }
            }
        }
    }
}

#[async_trait]
impl SubscriptionApi for Client {
    async fn create(&self, request: &CreateSubscriptionRequest) -> Result<SubscriptionRecord> {
        self.create_subscription(request).await
    }
}
