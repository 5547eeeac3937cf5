use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use domain::enrollment::{Attachment, EnrollmentPayload};
use domain::orders::{Assignment, OrderResource, ServiceRequest};
use domain::ports::{
    AuthProvider, DateRange, EnrollmentGateway, GatewayError, OrderGateway, ReservationGateway,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ulid::Ulid;

use crate::classify::classify;
use crate::config::{BackendConfig, StaticToken};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Serialize)]
struct NewReservation<'a> {
    room_id: &'a str,
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct NewOrder<'a> {
    booking_id: &'a str,
}

fn transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

/// One client for every backend endpoint.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, GatewayError> {
        Self::new(config, Arc::new(StaticToken(config.token.clone())))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request_id = Ulid::new().to_string();
        tracing::debug!(
            method = method.as_str(),
            path,
            request_id = %request_id,
            "Backend request"
        );
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(REQUEST_ID_HEADER, request_id);
        match self.auth.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends and classifies non-success responses against `resource_id`.
    async fn send(
        &self,
        builder: RequestBuilder,
        resource_id: &str,
    ) -> Result<Response, GatewayError> {
        let resp = builder.send().await.map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let err = classify(status, resource_id, &body);
        tracing::warn!(resource_id, status = status.as_u16(), "Backend refused request: {}", err);
        Err(err)
    }

    async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, GatewayError> {
        resp.json::<T>().await.map_err(transport)
    }
}

fn part(attachment: &Attachment) -> Result<Part, GatewayError> {
    Part::bytes(attachment.bytes.clone())
        .file_name(attachment.file_name.clone())
        .mime_str(&attachment.content_type)
        .map_err(transport)
}

#[async_trait]
impl ReservationGateway for HttpBackend {
    async fn create_reservation(
        &self,
        room_id: &str,
        dates: &DateRange,
    ) -> Result<String, GatewayError> {
        let body = NewReservation { room_id, check_in: dates.check_in, check_out: dates.check_out };
        let resp = self
            .send(self.request(Method::POST, "/reservations").json(&body), room_id)
            .await?;
        Ok(Self::json::<Created>(resp).await?.id)
    }
}

#[async_trait]
impl EnrollmentGateway for HttpBackend {
    async fn submit_enrollment(&self, payload: &EnrollmentPayload) -> Result<(), GatewayError> {
        let mut form = Form::new().text("reservation_id", payload.reservation_id.clone());
        for attachment in &payload.biometric {
            form = form.part("biometric", part(attachment)?);
        }
        for attachment in &payload.documents {
            form = form.part("document", part(attachment)?);
        }

        let path = format!("/reservations/{}/enrollment", payload.reservation_id);
        self.send(self.request(Method::POST, &path).multipart(form), &payload.reservation_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderGateway for HttpBackend {
    async fn list_resources(&self, booking_id: &str) -> Result<Vec<OrderResource>, GatewayError> {
        let builder = self.request(Method::GET, "/orders").query(&[("booking_id", booking_id)]);
        let resp = self.send(builder, booking_id).await?;
        Self::json(resp).await
    }

    async fn create_resource(&self, booking_id: &str) -> Result<String, GatewayError> {
        let builder = self.request(Method::POST, "/orders").json(&NewOrder { booking_id });
        let resp = self.send(builder, booking_id).await?;
        Ok(Self::json::<Created>(resp).await?.id)
    }

    async fn get_resource(&self, resource_id: &str) -> Result<OrderResource, GatewayError> {
        let path = format!("/orders/{}", resource_id);
        let resp = self.send(self.request(Method::GET, &path), resource_id).await?;
        Self::json(resp).await
    }

    async fn add_item(&self, resource_id: &str, item: &ServiceRequest) -> Result<(), GatewayError> {
        let path = format!("/orders/{}/items", resource_id);
        self.send(self.request(Method::POST, &path).json(item), resource_id).await?;
        Ok(())
    }

    async fn assign_handler(
        &self,
        resource_id: &str,
        assignment: &Assignment,
    ) -> Result<(), GatewayError> {
        let path = format!("/orders/{}/assignment", resource_id);
        self.send(self.request(Method::POST, &path).json(assignment), resource_id)
            .await?;
        Ok(())
    }
}
