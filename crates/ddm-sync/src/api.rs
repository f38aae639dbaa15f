use crate::config::SyncConfig;
use crate::error::ApiError;
use crate::request::{Fetch, QueryParams};
use crate::session::SessionStore;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ddm_core::{
    BeerOrLiquorBrand, BrandDraft, MixedDrinkDraft, MixedDrinkRecipe,
    MixedDrinkRecipeWithIngredients,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Header the login endpoint reads the base64 password from.
pub const LOGIN_HEADER: &str = "x-pw";
pub const BRANDS_PATH: &str = "/beers-and-liquors";
pub const MIXED_DRINKS_PATH: &str = "/mixed-drinks";

const INVALID_PASSWORD: &str = "Invalid Password.";

pub fn brand_path(id: &str) -> String {
    format!("/beer-or-liquor/{id}")
}

pub fn mixed_drink_path(id: &str) -> String {
    format!("/mixed-drink/{id}")
}

fn secure_path(resource: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("/secure/{resource}/{id}"),
        None => format!("/secure/{resource}"),
    }
}

/// HTTP client for the drink-menu API. Cookies set by the login endpoint are
/// attached to every later request.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: SyncConfig,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: SyncConfig, session: SessionStore) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self
            .config
            .endpoint(path)
            .map_err(|err| ApiError::network(err.to_string()))?;
        Ok(self.http.request(method, url))
    }

    /// Sends the request and turns non-2xx statuses into `ApiError`. A 401
    /// expires a confirmed session.
    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|err| {
            warn!(path, "api_network_error: {err}");
            ApiError::from(err)
        })?;
        let status = response.status();
        if status.is_success() {
            debug!(path, status = status.as_u16(), "api_ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status.as_u16(), &body);
        debug!(path, status = status.as_u16(), "api_error: {err}");
        if err.is_unauthorized() {
            self.session.mark_unauthorized();
        }
        Err(err)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &QueryParams,
    ) -> Result<T, ApiError> {
        let builder = self.request(Method::GET, path)?.query(params);
        let response = self.send(builder, path).await?;
        Ok(response.json::<T>().await?)
    }

    /// Resolves the initial session state: 200 means logged in, anything
    /// else (including no response) means logged out.
    pub async fn verify_token(&self) -> bool {
        let path = "/verify-token";
        let result = match self.request(Method::GET, path) {
            Ok(builder) => builder.send().await.map_err(ApiError::from),
            Err(err) => Err(err),
        };
        let logged_in = match result {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!("verify_token_failed: {err}");
                false
            }
        };
        self.session.resolve(logged_in);
        logged_in
    }

    pub async fn login(&self, password: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, "/login")?
            .header(LOGIN_HEADER, STANDARD.encode(password));
        match self.send(builder, "/login").await {
            Ok(_) => {
                info!("login_succeeded");
                self.session.login();
                Ok(())
            }
            Err(ApiError::Client { status: 422, .. }) => Err(ApiError::Client {
                status: 422,
                message: INVALID_PASSWORD.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let builder = self.request(Method::POST, "/logout")?;
        self.send(builder, "/logout").await?;
        info!("logout_succeeded");
        self.session.logout();
        Ok(())
    }

    pub async fn list_brands(&self, params: &QueryParams) -> Result<Vec<BeerOrLiquorBrand>, ApiError> {
        self.get_json(BRANDS_PATH, params).await
    }

    pub async fn get_brand(&self, id: &str) -> Result<BeerOrLiquorBrand, ApiError> {
        self.get_json(&brand_path(id), &QueryParams::new()).await
    }

    /// Creates the brand when `id` is `None`, otherwise replaces it.
    pub async fn save_brand(&self, id: Option<&str>, draft: &BrandDraft) -> Result<(), ApiError> {
        let body = draft.body()?;
        let path = secure_path("beer-or-liquor", id);
        let builder = self.request(Method::PUT, &path)?.json(&body);
        self.send(builder, &path).await?;
        info!(path = %path, "brand_saved");
        Ok(())
    }

    /// The server also removes mixed drinks that use this brand.
    pub async fn delete_brand(&self, id: &str) -> Result<(), ApiError> {
        let path = secure_path("beer-or-liquor", Some(id));
        let builder = self.request(Method::DELETE, &path)?;
        self.send(builder, &path).await?;
        info!(path = %path, "brand_deleted");
        Ok(())
    }

    pub async fn mark_in_stock(&self, id: &str, in_stock: bool) -> Result<(), ApiError> {
        let path = format!("/secure/beer-or-liquor/{id}/mark-in-stock/{in_stock}");
        let builder = self.request(Method::POST, &path)?;
        self.send(builder, &path).await?;
        info!(path = %path, "brand_stock_marked");
        Ok(())
    }

    pub async fn list_mixed_drinks(
        &self,
        params: &QueryParams,
    ) -> Result<Vec<MixedDrinkRecipeWithIngredients>, ApiError> {
        self.get_json(MIXED_DRINKS_PATH, params).await
    }

    pub async fn get_mixed_drink(&self, id: &str) -> Result<MixedDrinkRecipe, ApiError> {
        self.get_json(&mixed_drink_path(id), &QueryParams::new()).await
    }

    pub async fn save_mixed_drink(&self, id: Option<&str>, draft: &MixedDrinkDraft) -> Result<(), ApiError> {
        let body = draft.body()?;
        let path = secure_path("mixed-drink", id);
        let builder = self.request(Method::PUT, &path)?.json(&body);
        self.send(builder, &path).await?;
        info!(path = %path, "mixed_drink_saved");
        Ok(())
    }

    pub async fn delete_mixed_drink(&self, id: &str) -> Result<(), ApiError> {
        let path = secure_path("mixed-drink", Some(id));
        let builder = self.request(Method::DELETE, &path)?;
        self.send(builder, &path).await?;
        info!(path = %path, "mixed_drink_deleted");
        Ok(())
    }
}

#[async_trait]
impl<T> Fetch<T> for ApiClient
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self, path: &str, params: &QueryParams) -> Result<T, ApiError> {
        self.get_json(path, params).await
    }
}
