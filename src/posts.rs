use crate::cloudinary::CloudinaryClient;
use crate::envelope::ServiceError;
use crate::models::{
    PageResponse, PictureUpload, PostProduct, PostProductResponse, UpdatePostProductRequest,
    UploadPostProductRequest, VerifiedDecisionStatus, VerifiedPostProductRequest,
};
use crate::sellers::SellerDirectory;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

const CATEGORIES: &[(i64, &str)] = &[
    (1, "Electric Cars"),
    (2, "Electric Motorbikes"),
    (3, "Electric Vehicles"),
    (4, "Batteries & Chargers"),
    (5, "Spare Parts"),
];

const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct PostProducts {
    sellers: SellerDirectory,
    uploader: Option<CloudinaryClient>,
    inner: Arc<Mutex<PostState>>,
}

struct PostState {
    next_id: i64,
    posts: HashMap<i64, PostProduct>,
}

impl PostProducts {
    pub fn new(sellers: SellerDirectory, uploader: Option<CloudinaryClient>) -> Self {
        Self {
            sellers,
            uploader,
            inner: Arc::new(Mutex::new(PostState {
                next_id: 101,
                posts: HashMap::new(),
            })),
        }
    }

    /// Publish a new post. The caller must own an approved store with a
    /// posting credit left on its package; one credit is consumed per post.
    pub async fn create(
        &self,
        username: &str,
        request: UploadPostProductRequest,
        pictures: Vec<PictureUpload>,
    ) -> Result<PostProduct, ServiceError> {
        let seller = self.sellers.require_approved(username).await?;
        if pictures.is_empty() {
            return Err(ServiceError::unexpected("no picture parts in upload"));
        }
        let category_name = category_name(request.category_id).ok_or_else(|| {
            ServiceError::not_found(format!(
                "Category not found with id: {}",
                request.category_id
            ))
        })?;

        self.sellers.consume_post_credit(seller.id).await?;
        let urls = self.store_pictures(&pictures).await?;

        let mut state = self.inner.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        let post = PostProduct {
            id,
            seller_id: seller.id,
            seller_store_name: seller.store_name.clone(),
            title: request.title,
            brand: request.brand,
            model: request.model,
            manufacture_year: request.manufacture_year,
            used_duration: request.used_duration,
            condition_level: request.condition_level,
            price: request.price,
            length: request.length,
            width: request.width,
            height: request.height,
            weight: request.weight,
            description: request.description,
            location_trading: request.location_trading,
            category_id: request.category_id,
            category_name: category_name.to_string(),
            pictures: urls,
            verified_decision_status: VerifiedDecisionStatus::Pending,
            verified: false,
            active: true,
            created_at: Utc::now(),
        };
        state.posts.insert(id, post.clone());
        info!(
            target = "market.posts",
            post_id = id,
            seller = %seller.username,
            pictures = post.pictures.len(),
            "post product created",
        );
        Ok(post)
    }

    /// Append freshly uploaded pictures to an existing post.
    pub async fn append_pictures(
        &self,
        post_id: i64,
        pictures: Vec<PictureUpload>,
    ) -> Result<PostProduct, ServiceError> {
        if pictures.is_empty() {
            return Err(ServiceError::unexpected("no picture parts in upload"));
        }
        let urls = self.store_pictures(&pictures).await?;

        let mut state = self.inner.lock().await;
        let post = state.posts.get_mut(&post_id).ok_or_else(|| {
            ServiceError::not_found(format!("Post product not found with id: {post_id}"))
        })?;
        post.pictures.extend(urls);
        info!(
            target = "market.posts",
            post_id = post_id,
            pictures = post.pictures.len(),
            "post pictures appended",
        );
        Ok(post.clone())
    }

    /// Ask for a moderation pass on the post. Resets the decision status to
    /// PENDING so moderators pick it up again.
    pub async fn verification_request(
        &self,
        request: &VerifiedPostProductRequest,
    ) -> Result<PostProduct, ServiceError> {
        let mut state = self.inner.lock().await;
        let post = state.posts.get_mut(&request.post_id).ok_or_else(|| {
            ServiceError::not_found(format!(
                "Post product not found with id: {}",
                request.post_id
            ))
        })?;
        if !post.active {
            return Err(ServiceError::forbidden("Post product is not active"));
        }
        if post.verified {
            return Err(ServiceError::forbidden("Post product is already verified"));
        }
        post.verified_decision_status = VerifiedDecisionStatus::Pending;
        info!(
            target = "market.posts",
            post_id = post.id,
            "verification requested",
        );
        Ok(post.clone())
    }

    /// Newest-first page of the caller's posts.
    pub async fn list_for_seller(
        &self,
        username: &str,
        page: usize,
        size: usize,
    ) -> Result<PageResponse<PostProductResponse>, ServiceError> {
        let seller = self.sellers.require_profile(username).await?;
        let size = size.clamp(1, MAX_PAGE_SIZE);

        let state = self.inner.lock().await;
        let mut posts: Vec<&PostProduct> = state
            .posts
            .values()
            .filter(|post| post.seller_id == seller.id)
            .collect();
        posts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = posts.len();
        let items = posts
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .map(PostProductResponse::from)
            .collect();
        Ok(PageResponse {
            items,
            page,
            size,
            total,
        })
    }

    /// Owner-only partial update.
    pub async fn update(
        &self,
        username: &str,
        post_id: i64,
        request: UpdatePostProductRequest,
    ) -> Result<PostProduct, ServiceError> {
        let seller = self.sellers.require_profile(username).await?;

        let mut state = self.inner.lock().await;
        let post = state.posts.get_mut(&post_id).ok_or_else(|| {
            ServiceError::not_found(format!("Post product not found with id: {post_id}"))
        })?;
        if post.seller_id != seller.id {
            return Err(ServiceError::forbidden(
                "Post product belongs to another seller",
            ));
        }

        if let Some(title) = request.title {
            post.title = title;
        }
        if let Some(brand) = request.brand {
            post.brand = brand;
        }
        if let Some(model) = request.model {
            post.model = model;
        }
        if let Some(price) = request.price {
            post.price = price;
        }
        if let Some(description) = request.description {
            post.description = description;
        }
        if let Some(location_trading) = request.location_trading {
            post.location_trading = location_trading;
        }
        if let Some(active) = request.active {
            post.active = active;
        }
        info!(target = "market.posts", post_id = post.id, "post updated");
        Ok(post.clone())
    }

    /// Owner-only removal; returns the removed post.
    pub async fn delete(&self, username: &str, post_id: i64) -> Result<PostProduct, ServiceError> {
        let seller = self.sellers.require_profile(username).await?;

        let mut state = self.inner.lock().await;
        let owned = state
            .posts
            .get(&post_id)
            .map(|post| post.seller_id == seller.id);
        match owned {
            None => Err(ServiceError::not_found(format!(
                "Post product not found with id: {post_id}"
            ))),
            Some(false) => Err(ServiceError::forbidden(
                "Post product belongs to another seller",
            )),
            Some(true) => {
                let post = state.posts.remove(&post_id).ok_or_else(|| {
                    ServiceError::unexpected(format!("post {post_id} vanished during delete"))
                })?;
                info!(target = "market.posts", post_id = post_id, "post deleted");
                Ok(post)
            }
        }
    }

    async fn store_pictures(
        &self,
        pictures: &[PictureUpload],
    ) -> Result<Vec<String>, ServiceError> {
        let mut urls = Vec::with_capacity(pictures.len());
        for picture in pictures {
            let url = match &self.uploader {
                Some(client) => {
                    let url = client
                        .upload(picture)
                        .await
                        .map_err(|err| ServiceError::unexpected(err.to_string()))?;
                    crate::metrics::picture_uploaded("cloudinary");
                    url
                }
                None => {
                    crate::metrics::picture_uploaded("offline");
                    offline_picture_url(picture)
                }
            };
            urls.push(url);
        }
        Ok(urls)
    }
}

fn category_name(id: i64) -> Option<&'static str> {
    CATEGORIES
        .iter()
        .find(|(candidate, _)| *candidate == id)
        .map(|(_, name)| *name)
}

// Keeps the demo runnable without Cloudinary credentials.
fn offline_picture_url(picture: &PictureUpload) -> String {
    format!(
        "https://pictures.greenmarket.local/{}/{}",
        Uuid::new_v4(),
        picture.file_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::FailureKind;

    fn picture(name: &str) -> PictureUpload {
        PictureUpload {
            file_name: name.to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
        }
    }

    fn upload_request(title: &str) -> UploadPostProductRequest {
        UploadPostProductRequest {
            title: title.to_string(),
            brand: "Yadea".to_string(),
            model: "X5".to_string(),
            manufacture_year: 2022,
            used_duration: "6 months".to_string(),
            condition_level: "Good".to_string(),
            price: 850.0,
            length: "150".to_string(),
            width: "60".to_string(),
            height: "110".to_string(),
            weight: "25000".to_string(),
            description: "Lightly used electric bike in perfect condition.".to_string(),
            location_trading: "Ho Chi Minh City".to_string(),
            category_id: 3,
        }
    }

    fn service() -> PostProducts {
        PostProducts::new(SellerDirectory::demo(), None)
    }

    #[tokio::test]
    async fn create_publishes_post_and_consumes_credit() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("bike.jpg"),
            ])
            .await
            .expect("create");
        assert_eq!(post.id, 101);
        assert_eq!(post.seller_store_name, "EcoRider Shop");
        assert_eq!(post.category_name, "Electric Vehicles");
        assert_eq!(post.verified_decision_status, VerifiedDecisionStatus::Pending);
        assert!(!post.verified);
        assert!(post.active);
        assert_eq!(post.pictures.len(), 1);
        assert!(post.pictures[0].ends_with("/bike.jpg"));

        let subscription = posts
            .sellers
            .check_package_validity("viennehaha")
            .await
            .expect("subscription");
        assert_eq!(subscription.remaining_posts, Some(49));
    }

    #[tokio::test]
    async fn create_rejects_unapproved_seller() {
        let posts = service();
        let err = posts
            .create("minhtran", upload_request("Refurb Scooter"), vec![
                picture("scooter.jpg"),
            ])
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::Forbidden);
    }

    #[tokio::test]
    async fn create_rejects_unknown_category() {
        let posts = service();
        let mut request = upload_request("Used Electric Bike");
        request.category_id = 99;
        let err = posts
            .create("viennehaha", request, vec![picture("bike.jpg")])
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.detail(), "Category not found with id: 99");
    }

    #[tokio::test]
    async fn append_pictures_requires_existing_post() {
        let posts = service();
        let err = posts
            .append_pictures(999, vec![picture("extra.jpg")])
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(err.detail(), "Post product not found with id: 999");
    }

    #[tokio::test]
    async fn append_pictures_extends_the_gallery() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("front.jpg"),
            ])
            .await
            .expect("create");
        let updated = posts
            .append_pictures(post.id, vec![picture("back.jpg"), picture("side.jpg")])
            .await
            .expect("append");
        assert_eq!(updated.pictures.len(), 3);
    }

    #[tokio::test]
    async fn verification_request_rejects_inactive_post() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("bike.jpg"),
            ])
            .await
            .expect("create");
        posts
            .update(
                "viennehaha",
                post.id,
                UpdatePostProductRequest {
                    active: Some(false),
                    ..UpdatePostProductRequest::default()
                },
            )
            .await
            .expect("deactivate");

        let err = posts
            .verification_request(&VerifiedPostProductRequest { post_id: post.id })
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert_eq!(err.detail(), "Post product is not active");
    }

    #[tokio::test]
    async fn verification_request_resets_decision_status() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("bike.jpg"),
            ])
            .await
            .expect("create");
        let updated = posts
            .verification_request(&VerifiedPostProductRequest { post_id: post.id })
            .await
            .expect("request");
        assert_eq!(updated.verified_decision_status, VerifiedDecisionStatus::Pending);
        assert!(!updated.verified);
    }

    #[tokio::test]
    async fn listing_pages_newest_first() {
        let posts = service();
        for title in ["First", "Second", "Third"] {
            posts
                .create("viennehaha", upload_request(title), vec![picture("p.jpg")])
                .await
                .expect("create");
        }

        let first_page = posts
            .list_for_seller("viennehaha", 0, 2)
            .await
            .expect("page 0");
        assert_eq!(first_page.total, 3);
        assert_eq!(first_page.items.len(), 2);
        assert_eq!(first_page.items[0].title, "Third");

        let second_page = posts
            .list_for_seller("viennehaha", 1, 2)
            .await
            .expect("page 1");
        assert_eq!(second_page.items.len(), 1);
        assert_eq!(second_page.items[0].title, "First");
    }

    #[tokio::test]
    async fn update_is_owner_only() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("bike.jpg"),
            ])
            .await
            .expect("create");

        let err = posts
            .update(
                "minhtran",
                post.id,
                UpdatePostProductRequest {
                    price: Some(700.0),
                    ..UpdatePostProductRequest::default()
                },
            )
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), FailureKind::Forbidden);
        assert_eq!(err.detail(), "Post product belongs to another seller");
    }

    #[tokio::test]
    async fn delete_removes_the_post() {
        let posts = service();
        let post = posts
            .create("viennehaha", upload_request("Used Electric Bike"), vec![
                picture("bike.jpg"),
            ])
            .await
            .expect("create");
        let removed = posts
            .delete("viennehaha", post.id)
            .await
            .expect("delete");
        assert_eq!(removed.id, post.id);

        let err = posts
            .verification_request(&VerifiedPostProductRequest { post_id: post.id })
            .await
            .expect_err("gone");
        assert_eq!(err.kind(), FailureKind::NotFound);
    }
}
