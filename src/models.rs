use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellerStatus {
    Pending,
    Accepted,
    Rejected,
}

impl fmt::Display for SellerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SellerStatus::Pending => "PENDING",
            SellerStatus::Accepted => "ACCEPTED",
            SellerStatus::Rejected => "REJECTED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct Seller {
    pub id: i64,
    pub buyer_id: i64,
    pub username: String,
    pub store_name: String,
    pub status: SellerStatus,
    pub tax_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Posting subscription attached to a seller.
#[derive(Debug, Clone)]
pub struct ServicePackage {
    pub id: i64,
    pub name: String,
    pub expiry_date: DateTime<Utc>,
    pub remaining_posts: u32,
}

impl ServicePackage {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date > now && self.remaining_posts > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifiedDecisionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct PostProduct {
    pub id: i64,
    pub seller_id: i64,
    pub seller_store_name: String,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub manufacture_year: i32,
    pub used_duration: String,
    pub condition_level: String,
    pub price: f64,
    pub length: String,
    pub width: String,
    pub height: String,
    pub weight: String,
    pub description: String,
    pub location_trading: String,
    pub category_id: i64,
    pub category_name: String,
    pub pictures: Vec<String>,
    pub verified_decision_status: VerifiedDecisionStatus,
    pub verified: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Picture part lifted out of a multipart upload.
#[derive(Debug, Clone)]
pub struct PictureUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

// -------- Response projections --------

/// Subscription check result. Package fields are omitted entirely when the
/// seller has never purchased a package.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub valid: bool,
    pub has_valid_package: bool,
    pub seller_id: i64,
    pub package_id: Option<i64>,
    pub package_name: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub remaining_posts: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerResponse {
    pub seller_id: i64,
    pub buyer_id: i64,
    pub store_name: String,
    pub status: SellerStatus,
    pub tax_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Seller> for SellerResponse {
    fn from(seller: &Seller) -> Self {
        Self {
            seller_id: seller.id,
            buyer_id: seller.buyer_id,
            store_name: seller.store_name.clone(),
            status: seller.status,
            tax_number: seller.tax_number.clone(),
            created_at: seller.created_at,
            updated_at: seller.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostProductResponse {
    pub post_id: i64,
    pub seller_id: i64,
    pub seller_store_name: String,
    pub title: String,
    pub brand: String,
    pub model: String,
    pub manufacture_year: i32,
    pub used_duration: String,
    pub condition_level: String,
    pub price: f64,
    pub length: String,
    pub width: String,
    pub height: String,
    pub weight: String,
    pub description: String,
    pub location_trading: String,
    pub category_id: i64,
    pub category_name: String,
    pub pictures: Vec<String>,
    pub verified_decision_status: VerifiedDecisionStatus,
    pub verified: bool,
    pub active: bool,
}

impl From<&PostProduct> for PostProductResponse {
    fn from(post: &PostProduct) -> Self {
        Self {
            post_id: post.id,
            seller_id: post.seller_id,
            seller_store_name: post.seller_store_name.clone(),
            title: post.title.clone(),
            brand: post.brand.clone(),
            model: post.model.clone(),
            manufacture_year: post.manufacture_year,
            used_duration: post.used_duration.clone(),
            condition_level: post.condition_level.clone(),
            price: post.price,
            length: post.length.clone(),
            width: post.width.clone(),
            height: post.height.clone(),
            weight: post.weight.clone(),
            description: post.description.clone(),
            location_trading: post.location_trading.clone(),
            category_id: post.category_id,
            category_name: post.category_name.clone(),
            pictures: post.pictures.clone(),
            verified_decision_status: post.verified_decision_status,
            verified: post.verified,
            active: post.active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

// -------- Requests --------

/// Text fields of the multipart post-product upload. Binary parts arrive
/// separately under the `pictures` field name.
#[derive(Debug, Clone, Default)]
pub struct UploadPostProductRequest {
    pub title: String,
    pub brand: String,
    pub model: String,
    pub manufacture_year: i32,
    pub used_duration: String,
    pub condition_level: String,
    pub price: f64,
    pub length: String,
    pub width: String,
    pub height: String,
    pub weight: String,
    pub description: String,
    pub location_trading: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPostProductRequest {
    pub post_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostProductRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location_trading: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}
