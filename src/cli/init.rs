//! planr init command implementation
//!
//! Creates the config file, signs in anonymously when no identity exists,
//! and creates the user's store namespace.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{Config, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::identity;
use crate::output::{emit_success, HumanOutput};

use super::Context;

#[derive(Serialize)]
struct InitReport {
    home: PathBuf,
    user_id: String,
    namespace: PathBuf,
    created: InitCreated,
}

#[derive(Serialize)]
struct InitCreated {
    config: bool,
    identity: bool,
    namespace: bool,
}

pub fn run(ctx: &Context) -> Result<()> {
    std::fs::create_dir_all(&ctx.home)?;

    let config_path = ctx.home.join(CONFIG_FILE);
    let created_config = if config_path.exists() {
        false
    } else {
        Config::default().save(&config_path)?;
        true
    };

    let (user_id, created_identity) = match ctx.identity() {
        Ok(identity) => (identity.user_id, false),
        Err(Error::StoreUnavailable(_)) => (identity::sign_in_anonymous(&ctx.home)?.user_id, true),
        Err(err) => return Err(err),
    };

    let storage = ctx.storage_for(&user_id)?;
    let created_namespace = !storage.is_ready();
    storage.init_namespace()?;

    let report = InitReport {
        home: ctx.home.clone(),
        user_id: user_id.clone(),
        namespace: storage.namespace_dir().to_path_buf(),
        created: InitCreated {
            config: created_config,
            identity: created_identity,
            namespace: created_namespace,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILE);
    }
    if created_identity {
        created_items.push("anonymous identity");
    }
    if created_namespace {
        created_items.push("store");
    }

    let header = if created_items.is_empty() {
        "planr init: already initialized".to_string()
    } else {
        format!("planr init: created {}", created_items.join(", "))
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("home", ctx.home.display().to_string());
    human.push_summary("user", user_id);
    human.push_next_step("planr routine add \"Morning run\" --days mon,wed,fri");
    human.push_next_step("planr week");

    emit_success(ctx.output, "init", &report, Some(&human))
}
