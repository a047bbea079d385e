use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use kgfl_session::{Credentials, SessionContext, SessionError};

use crate::output::{print_error, print_success};
use crate::session;

pub async fn login(ctx: &SessionContext, username: &str, password: &str) -> Result<()> {
    match ctx.session().login(username, password).await {
        Ok(principal) => {
            let role = principal.role.as_deref().unwrap_or("viewer");
            print_success(&format!(
                "Logged in to {} as {} ({})",
                ctx.config().api.base_url.cyan(),
                principal.display_name().cyan(),
                role
            ));
            Ok(())
        }
        Err(SessionError::InvalidCredentials { message }) => {
            anyhow::bail!("Login rejected: {message}")
        }
        Err(e) => Err(e.into()),
    }
}

/// Works offline: only the local credential file is touched.
pub fn logout(profile: &str) -> Result<()> {
    let store = session::credential_store(profile)?;
    let had_credentials = store.path().exists();
    Credentials::new(Arc::new(store)).clear()?;
    if had_credentials {
        print_success("Logged out (credentials removed)");
    } else {
        println!("No credentials found for profile \"{profile}\"");
    }
    Ok(())
}

pub async fn whoami(ctx: &SessionContext, profile: &str) -> Result<()> {
    let state = ctx.session().restore_session().await?;
    let Some(principal) = state.principal() else {
        print_error(&format!("Not logged in (profile: \"{profile}\")"));
        return Ok(());
    };

    println!("{}: {}", "Profile".cyan(), profile);
    println!("{}: {}", "Server".cyan(), ctx.config().api.base_url.cyan());
    println!("{}: {}", "User".cyan(), principal.username);
    if principal.display_name() != principal.username {
        println!("{}: {}", "Name".cyan(), principal.display_name());
    }
    println!(
        "{}: {}{}",
        "Role".cyan(),
        principal.role.as_deref().unwrap_or("-"),
        if principal.is_superuser { " (superuser)" } else { "" }
    );
    if let Some(email) = &principal.email {
        println!("{}: {}", "Email".cyan(), email);
    }
    Ok(())
}
