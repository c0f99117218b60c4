use crate::envelope::ServiceError;
use crate::models::{Seller, SellerStatus, ServicePackage, SubscriptionResponse};
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Seller registry and subscription state. Persistence is out of scope for
/// this service, so the directory holds demo-seeded state behind a mutex,
/// shared by cloning.
#[derive(Clone)]
pub struct SellerDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

struct DirectoryState {
    /// Platform accounts, including buyers that never applied for a store.
    users: HashSet<String>,
    /// Seller profiles keyed by username.
    sellers: HashMap<String, Seller>,
    /// Service packages keyed by seller id.
    packages: HashMap<i64, ServicePackage>,
}

impl SellerDirectory {
    pub fn demo() -> Self {
        let now = Utc::now();
        let mut users = HashSet::new();
        for username in ["viennehaha", "minhtran", "linhbuyer"] {
            users.insert(username.to_string());
        }

        let mut sellers = HashMap::new();
        sellers.insert(
            "viennehaha".to_string(),
            Seller {
                id: 456,
                buyer_id: 123,
                username: "viennehaha".to_string(),
                store_name: "EcoRider Shop".to_string(),
                status: SellerStatus::Accepted,
                tax_number: "1234567890".to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        sellers.insert(
            "minhtran".to_string(),
            Seller {
                id: 457,
                buyer_id: 124,
                username: "minhtran".to_string(),
                store_name: "Minh Refurb".to_string(),
                status: SellerStatus::Pending,
                tax_number: "0987654321".to_string(),
                created_at: now,
                updated_at: now,
            },
        );

        let mut packages = HashMap::new();
        packages.insert(
            456,
            ServicePackage {
                id: 1,
                name: "Premium Seller Plan".to_string(),
                expiry_date: now + Duration::days(90),
                remaining_posts: 50,
            },
        );

        Self {
            inner: Arc::new(Mutex::new(DirectoryState {
                users,
                sellers,
                packages,
            })),
        }
    }

    /// Subscription check for an arbitrary username supplied in the path.
    pub async fn check_package_validity(
        &self,
        username: &str,
    ) -> Result<SubscriptionResponse, ServiceError> {
        let state = self.inner.lock().await;
        if !state.users.contains(username) {
            return Err(ServiceError::not_found(format!("User not found: {username}")));
        }
        let seller = state.sellers.get(username).ok_or_else(|| {
            ServiceError::not_found(format!("Seller profile not found for user: {username}"))
        })?;
        if seller.status != SellerStatus::Accepted {
            return Err(ServiceError::forbidden(format!(
                "Seller not approved. Current status: {}",
                seller.status
            )));
        }

        let now = Utc::now();
        let response = match state.packages.get(&seller.id) {
            Some(package) => {
                let valid = package.is_valid(now);
                SubscriptionResponse {
                    valid,
                    has_valid_package: valid,
                    seller_id: seller.id,
                    package_id: Some(package.id),
                    package_name: Some(package.name.clone()),
                    expiry_date: Some(package.expiry_date),
                    remaining_posts: Some(package.remaining_posts),
                }
            }
            None => SubscriptionResponse {
                valid: false,
                has_valid_package: false,
                seller_id: seller.id,
                package_id: None,
                package_name: None,
                expiry_date: None,
                remaining_posts: None,
            },
        };
        info!(
            target = "market.sellers",
            username = username,
            valid = response.valid,
            "package validity checked",
        );
        Ok(response)
    }

    /// Profile lookup for an authenticated user. Absence is reported with an
    /// empty result, not a failure; the boundary coerces it to 404.
    pub async fn profile(&self, username: &str) -> Result<Option<Seller>, ServiceError> {
        let state = self.inner.lock().await;
        Ok(state.sellers.get(username).cloned())
    }

    /// Seller profile for an authenticated user, required to exist.
    pub async fn require_profile(&self, username: &str) -> Result<Seller, ServiceError> {
        let state = self.inner.lock().await;
        state.sellers.get(username).cloned().ok_or_else(|| {
            ServiceError::not_found(format!("Seller profile not found for user: {username}"))
        })
    }

    /// Like [`require_profile`], but the seller must also be approved.
    ///
    /// [`require_profile`]: SellerDirectory::require_profile
    pub async fn require_approved(&self, username: &str) -> Result<Seller, ServiceError> {
        let seller = self.require_profile(username).await?;
        if seller.status != SellerStatus::Accepted {
            return Err(ServiceError::forbidden(format!(
                "Seller not approved. Current status: {}",
                seller.status
            )));
        }
        Ok(seller)
    }

    /// Consume one posting credit from the seller's package.
    pub async fn consume_post_credit(&self, seller_id: i64) -> Result<(), ServiceError> {
        let mut state = self.inner.lock().await;
        let package = state.packages.get_mut(&seller_id).ok_or_else(|| {
            ServiceError::forbidden("No active service package. Purchase a package before posting.")
        })?;
        if package.expiry_date <= Utc::now() {
            return Err(ServiceError::forbidden(format!(
                "Service package expired on {}",
                package.expiry_date
            )));
        }
        if package.remaining_posts == 0 {
            return Err(ServiceError::forbidden(
                "No remaining posts in service package",
            ));
        }
        package.remaining_posts -= 1;
        Ok(())
    }
}
