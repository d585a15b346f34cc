//! planr auth commands

use serde::Serialize;

use crate::error::{Error, Result};
use crate::identity::{self, AuthMethod, Identity, Session};
use crate::output::{emit_success, HumanOutput};

use super::Context;

pub struct LoginOptions {
    pub anonymous: bool,
    pub uid: Option<String>,
    pub provider: Option<String>,
}

#[derive(Serialize)]
struct LoginReport<'a> {
    session: &'a Session,
    namespace_created: bool,
}

fn method_label(method: &AuthMethod) -> String {
    match method {
        AuthMethod::Anonymous => "anonymous".to_string(),
        AuthMethod::Federated { provider } => format!("federated ({provider})"),
    }
}

pub fn run_login(ctx: &Context, options: LoginOptions) -> Result<()> {
    std::fs::create_dir_all(&ctx.home)?;

    let session = match (options.provider.as_deref(), options.uid.as_deref()) {
        (None, None) => identity::sign_in_anonymous(&ctx.home)?,
        (Some(provider), Some(uid)) if !options.anonymous => {
            identity::sign_in_federated(&ctx.home, provider, uid)?
        }
        _ => {
            return Err(Error::InvalidArgument(
                "use either --anonymous or --uid with --provider".to_string(),
            ))
        }
    };

    let storage = ctx.storage_for(&session.user_id)?;
    let namespace_created = !storage.is_ready();
    storage.init_namespace()?;

    let mut human = HumanOutput::new(format!("planr auth login: signed in as {}", session.user_id));
    human.push_summary("method", method_label(&session.method));
    if namespace_created {
        human.push_detail("created an empty store for this user");
    }

    emit_success(
        ctx.output,
        "auth login",
        &LoginReport {
            session: &session,
            namespace_created,
        },
        Some(&human),
    )
}

pub fn run_logout(ctx: &Context) -> Result<()> {
    let signed_out = identity::sign_out(&ctx.home)?;

    #[derive(Serialize)]
    struct LogoutReport {
        signed_out: bool,
    }

    let header = if signed_out {
        "planr auth logout: signed out"
    } else {
        "planr auth logout: no session"
    };
    let human = HumanOutput::new(header);
    emit_success(
        ctx.output,
        "auth logout",
        &LogoutReport { signed_out },
        Some(&human),
    )
}

pub fn run_whoami(ctx: &Context) -> Result<()> {
    let identity: Identity = ctx.identity()?;
    let ready = ctx.storage_for(&identity.user_id)?.is_ready();

    #[derive(Serialize)]
    struct WhoamiReport<'a> {
        #[serde(flatten)]
        identity: &'a Identity,
        store_ready: bool,
    }

    let mut human = HumanOutput::new(identity.user_id.clone());
    human.push_summary("source", format!("{:?}", identity.source).to_lowercase());
    if let Some(session) = &identity.session {
        human.push_summary("method", method_label(&session.method));
        human.push_summary("since", session.signed_in_at.to_rfc3339());
    }
    if !ready {
        human.push_warning("no store for this user yet");
        human.push_next_step("planr init");
    }

    emit_success(
        ctx.output,
        "auth whoami",
        &WhoamiReport {
            identity: &identity,
            store_ready: ready,
        },
        Some(&human),
    )
}
