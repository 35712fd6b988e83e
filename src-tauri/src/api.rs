//! API Client Module
//!
//! Typed calls to the Growth Tracker backend. Every call goes through the
//! auth interceptor, so an expired session is renewed transparently.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info};

use crate::auth::{LoginCredentials, Role, SignupForm, User};
use crate::config::Config;
use crate::http::{ApiError, ApiRequest, ApiResponse, HttpClient, Transport};
use crate::interceptor::{AuthInterceptor, SessionListener, LOGOUT_PATH};
use crate::models::{
    latest_accepted, Child, Consultation, ConsultationMessage, ConsultationRequestInput,
    ConsultationSide, GrowthData, GrowthDataInput, MembershipPackage, PageQuery, PaymentProvider,
    PaymentRequest, SortOrder,
};

/// API client for the Growth Tracker backend
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<AuthInterceptor>,
}

impl ApiClient {
    /// Create a client over any transport
    pub fn new(transport: Arc<dyn Transport>, listener: Option<Arc<dyn SessionListener>>) -> Self {
        let mut interceptor = AuthInterceptor::new(transport);
        if let Some(listener) = listener {
            interceptor = interceptor.with_listener(listener);
        }
        Self {
            inner: Arc::new(interceptor),
        }
    }

    /// Create a client talking HTTP to `config.api_base_url`
    pub fn from_config(
        config: &Config,
        listener: Option<Arc<dyn SessionListener>>,
    ) -> Result<Self, ApiError> {
        let http = HttpClient::new(config)?;
        info!("API client targeting {}", http.base_url());
        Ok(Self::new(Arc::new(http), listener))
    }

    /// Send a raw request through the interceptor
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.inner.execute(request).await
    }

    /// Number of session renewals performed so far
    pub fn renewals(&self) -> u64 {
        self.inner.renewals()
    }

    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.execute(request).await?.json()
    }

    // Session

    pub async fn me(&self) -> Result<User, ApiError> {
        let body: UserEnvelope = self.fetch(ApiRequest::get("/auth/me")).await?;
        Ok(body.user)
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), ApiError> {
        debug!("Logging in as {}", credentials.email);
        let request = ApiRequest::post("/auth/login")
            .without_renewal()
            .json(credentials)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/signup").without_renewal().json(form)?;
        self.execute(request).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::post(LOGOUT_PATH).without_renewal())
            .await?;
        Ok(())
    }

    // Users

    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        let body: UserEnvelope = self.fetch(ApiRequest::get(format!("/users/{user_id}"))).await?;
        Ok(body.user)
    }

    /// Doctors on the current page of `/users`
    pub async fn list_doctors(&self, page: &PageQuery) -> Result<Vec<User>, ApiError> {
        let request = ApiRequest::get("/users").queries(page.to_pairs());
        let body: UsersEnvelope = self.fetch(request).await?;
        Ok(body
            .users
            .into_iter()
            .filter(|u| u.role == Role::Doctor)
            .collect())
    }

    // Children

    pub async fn list_children(&self, page: &PageQuery) -> Result<Vec<Child>, ApiError> {
        let request = ApiRequest::get("/children").queries(page.to_pairs());
        let body: ChildrenEnvelope = self.fetch(request).await?;
        Ok(body.children)
    }

    pub async fn get_growth_data(
        &self,
        child_id: &str,
        growth_data_id: &str,
    ) -> Result<GrowthData, ApiError> {
        let path = format!("/children/{child_id}/growth-data/{growth_data_id}");
        let body: GrowthDataEnvelope = self.fetch(ApiRequest::get(path)).await?;
        Ok(body.growth_data)
    }

    pub async fn update_growth_data(
        &self,
        child_id: &str,
        growth_data_id: &str,
        input: &GrowthDataInput,
    ) -> Result<(), ApiError> {
        input.validate(chrono::Utc::now().date_naive())?;
        let path = format!("/children/{child_id}/growth-data/{growth_data_id}");
        self.execute(ApiRequest::put(path).json(input)?).await?;
        info!("Growth data {} updated", growth_data_id);
        Ok(())
    }

    // Consultations

    /// Accepted consultations, latest per request, most recently updated
    /// first. Unsorted pages are ordered by date, newest first.
    pub async fn consultation_history(
        &self,
        user_id: &str,
        side: ConsultationSide,
        page: &PageQuery,
    ) -> Result<Vec<Consultation>, ApiError> {
        let page = match page.sort_by {
            Some(_) => page.clone(),
            None => page.clone().sorted("date", SortOrder::Descending),
        };
        let request = ApiRequest::get(format!("/consultations/users/{user_id}"))
            .queries(page.to_pairs())
            .query("as", side.as_str());
        let body: ConsultationsEnvelope = self.fetch(request).await?;
        let received = body.consultations.len();
        let history = latest_accepted(body.consultations);
        debug!("Consultation history: {} of {} shown", history.len(), received);
        Ok(history)
    }

    pub async fn request_consultation(
        &self,
        input: &ConsultationRequestInput,
    ) -> Result<(), ApiError> {
        input.validate()?;
        self.execute(ApiRequest::post("/requests").json(input)?).await?;
        info!("Consultation requested: {}", input.title);
        Ok(())
    }

    /// Messages of one consultation, oldest first
    pub async fn consultation_messages(
        &self,
        consultation_id: &str,
    ) -> Result<Vec<ConsultationMessage>, ApiError> {
        let path = format!("/consultation-messages/consultations/{consultation_id}");
        let body: MessagesEnvelope = self.fetch(ApiRequest::get(path)).await?;
        let mut messages = body.consultation_messages;
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    /// Post a message; returns its id when the backend reports one
    pub async fn send_consultation_message(
        &self,
        consultation_id: &str,
        message: &str,
    ) -> Result<Option<String>, ApiError> {
        if message.trim().is_empty() {
            return Err(ApiError::Validation(vec![crate::validation::FieldError::new(
                "message",
                "Message cannot be empty",
            )]));
        }
        let request = ApiRequest::post("/consultation-messages")
            .form(&[("consultationId", consultation_id), ("message", message)]);
        let response = self.execute(request).await?;
        let created: CreatedEnvelope = response.json().unwrap_or_default();
        Ok(created.id)
    }

    // Membership & payments

    pub async fn membership_package(&self, package_id: &str) -> Result<MembershipPackage, ApiError> {
        let body: PackageEnvelope = self
            .fetch(ApiRequest::get(format!("/membership-packages/{package_id}")))
            .await?;
        Ok(body.package)
    }

    /// Start a payment; returns the checkout URL to open
    pub async fn create_payment(
        &self,
        provider: PaymentProvider,
        payment: &PaymentRequest,
    ) -> Result<String, ApiError> {
        let path = format!("/payments/{}/create", provider.as_str());
        let body: CheckoutEnvelope = self.fetch(ApiRequest::post(path).json(payment)?).await?;
        body.link
            .or(body.url)
            .ok_or_else(|| ApiError::Parse(format!("No payment URL received from {}", provider.as_str())))
    }
}

/// Default listing used by the consultation request form
pub fn children_for_request() -> PageQuery {
    PageQuery::default().sorted("name", SortOrder::Descending)
}

// Request/Response types

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct UsersEnvelope {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Deserialize)]
struct ChildrenEnvelope {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrowthDataEnvelope {
    growth_data: GrowthData,
}

#[derive(Deserialize)]
struct ConsultationsEnvelope {
    #[serde(default)]
    consultations: Vec<Consultation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesEnvelope {
    #[serde(default)]
    consultation_messages: Vec<ConsultationMessage>,
}

#[derive(Deserialize, Default)]
struct CreatedEnvelope {
    #[serde(rename = "_id", default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct PackageEnvelope {
    package: MembershipPackage,
}

#[derive(Deserialize)]
struct CheckoutEnvelope {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RequestBody;
    use crate::interceptor::RENEW_PATH;
    use crate::test_support::ScriptedTransport;

    fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
        ApiClient::new(transport.clone(), None)
    }

    #[tokio::test]
    async fn test_list_children_sends_paging() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/children",
            200,
            r#"{"children":[{"_id":"k1","name":"Minh","birthDate":"2022-03-01T00:00:00.000Z"}]}"#,
        );
        let api = client(&transport);

        let children = api.list_children(&children_for_request()).await.unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Minh");
        let sent = &transport.requests()[0];
        assert!(sent.query.contains(&("sortBy".to_string(), "name".to_string())));
        assert!(sent.query.contains(&("order".to_string(), "descending".to_string())));
    }

    #[tokio::test]
    async fn test_expired_session_is_transparent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/children", 401, "");
        transport.respond("/children", 200, r#"{"children":[]}"#);
        transport.respond(RENEW_PATH, 200, "");
        let api = client(&transport);

        let children = api.list_children(&PageQuery::default()).await.unwrap();

        assert!(children.is_empty());
        assert_eq!(api.renewals(), 1);
    }

    #[tokio::test]
    async fn test_list_doctors_filters_roles() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/users",
            200,
            r#"{"users":[
                {"_id":"u1","name":"Ha","email":"ha@example.com","role":0},
                {"_id":"d1","name":"Dr. Lan","email":"lan@example.com","role":2},
                {"_id":"a1","name":"Admin","email":"admin@example.com","role":1}
            ]}"#,
        );
        let api = client(&transport);

        let doctors = api.list_doctors(&PageQuery::default()).await.unwrap();
        assert_eq!(doctors.len(), 1);
        assert_eq!(doctors[0].id, "d1");
    }

    #[tokio::test]
    async fn test_history_requests_side() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/consultations/users/u1", 200, r#"{"consultations":[]}"#);
        let api = client(&transport);

        api.consultation_history("u1", ConsultationSide::Doctor, &PageQuery::default())
            .await
            .unwrap();
        let sent = &transport.requests()[0];
        assert!(sent.query.contains(&("as".to_string(), "DOCTOR".to_string())));
        assert!(sent.query.contains(&("sortBy".to_string(), "date".to_string())));
        assert!(sent.query.contains(&("order".to_string(), "descending".to_string())));
    }

    #[tokio::test]
    async fn test_history_shows_only_accepted() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/consultations/users/u1",
            200,
            r#"{"consultations":[
                {"_id":"c1","requestId":"r1","requestDetails":{"status":"Pending"},
                 "createdAt":"2024-05-01T08:00:00Z","updatedAt":"2024-05-01T08:00:00Z"},
                {"_id":"c2","requestId":"r2","requestDetails":{"status":"Accepted"},
                 "createdAt":"2024-05-01T08:00:00Z","updatedAt":"2024-05-02T08:00:00Z"},
                {"_id":"c3","requestId":"r2","requestDetails":{"status":"Accepted"},
                 "createdAt":"2024-05-01T08:00:00Z","updatedAt":"2024-05-01T09:00:00Z"}
            ]}"#,
        );
        let api = client(&transport);

        let history = api
            .consultation_history("u1", ConsultationSide::Member, &PageQuery::default())
            .await
            .unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "c2");
    }

    #[tokio::test]
    async fn test_history_keeps_caller_sorting() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/consultations/users/u1", 200, r#"{"consultations":[]}"#);
        let api = client(&transport);

        let page = PageQuery::default().sorted("title", SortOrder::Ascending);
        api.consultation_history("u1", ConsultationSide::Member, &page)
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert!(sent.query.contains(&("sortBy".to_string(), "title".to_string())));
        assert!(!sent.query.contains(&("sortBy".to_string(), "date".to_string())));
    }

    #[tokio::test]
    async fn test_message_sent_as_form_fields() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/consultation-messages", 201, r#"{"_id":"m9"}"#);
        let api = client(&transport);

        let id = api.send_consultation_message("c1", "Is this rash normal?").await.unwrap();

        assert_eq!(id.as_deref(), Some("m9"));
        let sent = &transport.requests()[0];
        assert_eq!(
            sent.body,
            Some(RequestBody::Form(vec![
                ("consultationId".to_string(), "c1".to_string()),
                ("message".to_string(), "Is this rash normal?".to_string()),
            ]))
        );
    }

    #[tokio::test]
    async fn test_package_price_feeds_payment() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/membership-packages/p1",
            200,
            r#"{"package":{"_id":"p1","name":"Premium","price":{"value":1200000,"unit":"VND"}}}"#,
        );
        let api = client(&transport);

        let package = api.membership_package("p1").await.unwrap();
        let payment = PaymentRequest::membership(&package);

        assert_eq!(payment.price, "1200000");
        assert_eq!(package.price.to_string(), "1,200,000 VND");
    }

    #[tokio::test]
    async fn test_messages_sorted_oldest_first() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/consultation-messages/consultations/c1",
            200,
            r#"{"consultationMessages":[
                {"_id":"m2","sender":"d1","message":"Hello","createdAt":"2024-05-01T09:00:00Z"},
                {"_id":"m1","sender":"u1","message":"Hi doctor","createdAt":"2024-05-01T08:00:00Z"}
            ]}"#,
        );
        let api = client(&transport);

        let messages = api.consultation_messages("c1").await.unwrap();
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_empty_message_is_not_sent() {
        let transport = Arc::new(ScriptedTransport::new());
        let api = client(&transport);

        let err = api.send_consultation_message("c1", "   ").await.unwrap_err();
        assert_eq!(err.field_errors()[0].field, "message");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_payment_link_from_either_provider() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/payments/paypal/create", 200, r#"{"link":"https://paypal.test/c/1"}"#);
        transport.respond("/payments/vnpay/create", 200, r#"{"url":"https://vnpay.test/p/1"}"#);
        transport.respond("/payments/vnpay/create", 200, r#"{}"#);
        let api = client(&transport);
        let payment = PaymentRequest {
            price: "99000".to_string(),
            package_id: "p1".to_string(),
            purchase_type: "MEMBERSHIP".to_string(),
        };

        assert_eq!(
            api.create_payment(PaymentProvider::Paypal, &payment).await.unwrap(),
            "https://paypal.test/c/1"
        );
        assert_eq!(
            api.create_payment(PaymentProvider::Vnpay, &payment).await.unwrap(),
            "https://vnpay.test/p/1"
        );
        assert!(matches!(
            api.create_payment(PaymentProvider::Vnpay, &payment).await,
            Err(ApiError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_validation_errors_pass_through() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            "/requests",
            400,
            r#"{"message":"Invalid request","validationErrors":[{"field":"title","error":"Title too long"}]}"#,
        );
        let api = client(&transport);
        let input = ConsultationRequestInput {
            title: "x".repeat(300),
            doctor_id: "d1".to_string(),
            child_ids: vec!["k1".to_string()],
        };

        let err = api.request_consultation(&input).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.field_errors()[0].error, "Title too long");
        assert_eq!(err.user_message(), "Invalid request");
    }
}
