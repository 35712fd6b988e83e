//! Domain records exchanged with the backend.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::validation::{FieldError, Validator};

/// Sort direction understood by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

/// Paging and sorting for list endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: u32,
    pub size: u32,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            size: 10,
            search: None,
            sort_by: None,
            order: None,
        }
    }
}

impl PageQuery {
    pub fn sorted(mut self, sort_by: &str, order: SortOrder) -> Self {
        self.sort_by = Some(sort_by.to_string());
        self.order = Some(order);
        self
    }

    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("size".to_string(), self.size.to_string()),
        ];
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sortBy".to_string(), sort_by.clone()));
        }
        if let Some(order) = self.order {
            pairs.push(("order".to_string(), order.as_str().to_string()));
        }
        pairs
    }
}

/// A child profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gender: Option<i64>,
}

/// One growth measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthData {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub input_date: DateTime<Utc>,
    pub height: f64,
    pub weight: f64,
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub head_circumference: Option<f64>,
    #[serde(default)]
    pub arm_circumference: Option<f64>,
    /// Per-metric percentile results computed by the backend.
    #[serde(default)]
    pub growth_result: serde_json::Map<String, serde_json::Value>,
}

/// Growth measurement form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthDataInput {
    pub input_date: NaiveDate,
    pub height: f64,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_circumference: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_circumference: Option<f64>,
}

impl GrowthDataInput {
    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .check(
                "inputDate",
                self.input_date <= today,
                "Input date must be a valid past or present date",
            )
            .positive("height", Some(self.height), "Height must be greater than zero")
            .positive("weight", Some(self.weight), "Weight must be greater than zero")
            .positive(
                "headCircumference",
                self.head_circumference,
                "Head circumference must be greater than zero",
            )
            .positive(
                "armCircumference",
                self.arm_circumference,
                "Arm circumference must be greater than zero",
            )
            .finish()
    }
}

/// Status of a consultation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    #[serde(other)]
    Other,
}

/// A person referenced from a consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// The request a consultation was opened from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    #[serde(default)]
    pub title: Option<String>,
    pub status: RequestStatus,
    #[serde(default)]
    pub member: Option<Participant>,
    #[serde(default)]
    pub doctor: Option<Participant>,
    #[serde(default)]
    pub children: Vec<Child>,
}

/// A consultation between a member and a doctor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub request_details: Option<RequestDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consultation {
    pub fn is_accepted(&self) -> bool {
        self.request_details
            .as_ref()
            .is_some_and(|d| d.status == RequestStatus::Accepted)
    }
}

/// Accepted consultations only, the most recently updated one per request,
/// newest first.
pub fn latest_accepted(consultations: Vec<Consultation>) -> Vec<Consultation> {
    let mut latest: HashMap<String, Consultation> = HashMap::new();
    for consultation in consultations.into_iter().filter(Consultation::is_accepted) {
        let key = consultation
            .request_id
            .clone()
            .unwrap_or_else(|| consultation.id.clone());
        match latest.get(&key) {
            Some(kept) if kept.updated_at >= consultation.updated_at => {}
            _ => {
                latest.insert(key, consultation);
            }
        }
    }

    let mut history: Vec<Consultation> = latest.into_values().collect();
    history.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    history
}

/// Which side of a consultation the history is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsultationSide {
    Member,
    Doctor,
}

impl ConsultationSide {
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Member => Some(ConsultationSide::Member),
            Role::Doctor => Some(ConsultationSide::Doctor),
            Role::Unknown(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsultationSide::Member => "MEMBER",
            ConsultationSide::Doctor => "DOCTOR",
        }
    }
}

/// A chat message inside a consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub sender: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// New consultation request form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequestInput {
    pub title: String,
    pub doctor_id: String,
    pub child_ids: Vec<String>,
}

impl ConsultationRequestInput {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        Validator::new()
            .required("title", &self.title, "Title is required")
            .required("doctorId", &self.doctor_id, "Please select a doctor")
            .check("childIds", !self.child_ids.is_empty(), "Please select a child")
            .finish()
    }
}

/// A membership plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPackage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub duration: Option<serde_json::Value>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A package price, e.g. `{"value": 1200000, "unit": "VND"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub value: f64,
    #[serde(default)]
    pub unit: String,
}

impl Price {
    /// Plain amount as the payment endpoints take it: `1200000`.
    pub fn amount(&self) -> String {
        if self.value.fract() == 0.0 {
            format!("{:.0}", self.value)
        } else {
            self.value.to_string()
        }
    }
}

/// `1,200,000 VND`
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let amount = self.amount();
        let (whole, fraction) = match amount.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (amount.as_str(), None),
        };

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, digit) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(digit);
        }
        if let Some(fraction) = fraction {
            grouped.push('.');
            grouped.push_str(fraction);
        }

        if self.unit.is_empty() {
            write!(f, "{grouped}")
        } else {
            write!(f, "{grouped} {}", self.unit)
        }
    }
}

/// Payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Paypal,
    Vnpay,
}

impl PaymentProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProvider::Paypal => "paypal",
            PaymentProvider::Vnpay => "vnpay",
        }
    }
}

/// Payment creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub price: String,
    pub package_id: String,
    pub purchase_type: String,
}

impl PaymentRequest {
    pub fn membership(package: &MembershipPackage) -> Self {
        Self {
            price: package.price.amount(),
            package_id: package.id.clone(),
            purchase_type: "MEMBERSHIP".to_string(),
        }
    }
}
