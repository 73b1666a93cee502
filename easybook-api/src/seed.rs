use easybook_core::repository::UserRepository;
use easybook_core::{CoreResult, Role, User};
use easybook_store::app_config::SeedConfig;
use tracing::info;

/// Creates the configured admin account unless that email already exists.
/// Returns true when an account was created.
pub async fn ensure_admin(users: &dyn UserRepository, seed: &SeedConfig, password_cost: u32) -> CoreResult<bool> {
    let (Some(email), Some(password)) = (seed.admin_email.as_deref(), seed.admin_password.as_deref()) else {
        return Ok(false);
    };

    if users.find_by_email(email).await?.is_some() {
        return Ok(false);
    }

    let admin = User::new(email, password, "Administrator", None, Role::Admin, password_cost)?;
    users.create_user(&admin).await?;
    info!(user_id = %admin.id, "Seeded admin account");
    Ok(true)
}
