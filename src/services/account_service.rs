use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::domain::{User, UserCreate, UserId};
use crate::error::AccountError;
use crate::store::Store;

/// Account registration and lookup.
pub struct AccountService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for AccountService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> AccountService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(fields(user_email = %user.email, role = user.role.as_str()), skip(self, user))]
    pub async fn create_user(&self, user: UserCreate) -> Result<User, AccountError> {
        debug!("Processing create_user request");

        let email = user.email.trim();
        if email.is_empty() || !email.contains('@') {
            error!("Validation failed: invalid email");
            return Err(AccountError::ValidationError("Valid email required".to_string()));
        }

        let user = UserCreate::new(email, user.role);
        let user = self.store.create_user(user).await?;
        info!(user_id = user.id, "User created successfully");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: UserId) -> Result<User, AccountError> {
        match self.store.find_user(id).await? {
            Some(user) => {
                debug!(user_email = %user.email, "User found");
                Ok(user)
            }
            None => Err(AccountError::NotFound(id)),
        }
    }
}
