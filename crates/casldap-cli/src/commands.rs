//! `lookup` and `create-user`

use anyhow::Result;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use casldap_core::{DirectoryEntry, LdapSettings, PrivilegeGrant, UserRepository};
use casldap_directory::{AttributeResolver, Connector, DirectorySearch};

/// Per-token outcome counts for a batch command
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    /// True when there was at least one token and none succeeded
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }

    /// Count one token's outcome, reporting a failure on `err`.
    fn record<T>(&mut self, token: &str, result: Result<T>, err: &mut impl Write) -> Result<()> {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                warn!(token = %token, "{:#}", e);
                writeln!(err, "{}: {:#}", token, e)?;
                self.failed += 1;
            }
        }
        Ok(())
    }
}

/// Render an entry for display.
///
/// With `attributes` the listed attributes are shown one per line, padded to
/// 15 columns; otherwise every textual and binary attribute of the entry.
pub fn format_entry(entry: &DirectoryEntry, attributes: Option<&[String]>) -> Vec<String> {
    match attributes {
        Some(attributes) => attributes
            .iter()
            .map(|attr| {
                let value = entry.get(attr).map(|v| v.join(", ")).unwrap_or_default();
                format!("{:<15} {}", attr, value)
            })
            .collect(),
        None => {
            let mut lines = vec![format!("dn: {}", entry.dn)];
            for (name, values) in entry.attributes() {
                lines.extend(values.iter().map(|v| format!("{}: {}", name, v)));
            }
            for (name, values) in entry.binary_attributes() {
                lines.extend(values.iter().map(|v| format!("{}: <{} bytes>", name, v.len())));
            }
            lines
        }
    }
}

/// Look each token up and print the entry on `out`; failures go to `err`
/// and the batch continues.
pub async fn lookup(
    settings: Arc<LdapSettings>,
    connector: &dyn Connector,
    tokens: &[String],
    all: bool,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for token in tokens {
        writeln!(out, "\nLooking for {}...", token)?;

        let result = DirectorySearch::lookup(settings.clone(), connector, token, all).await;
        if let Ok(entry) = &result {
            let listed = if all { None } else { settings.attributes.as_deref() };
            for line in format_entry(entry, listed) {
                writeln!(out, "{}", line)?;
            }
        }
        report.record(token, result.map_err(Into::into), err)?;
    }

    Ok(report)
}

/// Provision a local user for each token from the directory.
///
/// The directory entry must exist before a local record is created.
/// Failures go to `err` and the batch continues.
#[instrument(skip(resolver, out, err))]
pub async fn create_users<R: UserRepository + 'static>(
    resolver: &AttributeResolver<R>,
    tokens: &[String],
    grant: PrivilegeGrant,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    for token in tokens {
        let result = create_user(resolver, token, grant).await;
        match &result {
            Ok(true) => writeln!(out, "Created user {}", token)?,
            Ok(false) => writeln!(out, "Updated existing user {}", token)?,
            Err(_) => {}
        }
        report.record(token, result, err)?;
    }

    Ok(report)
}

/// Returns true when the local record was created by this call.
async fn create_user<R: UserRepository + 'static>(
    resolver: &AttributeResolver<R>,
    token: &str,
    grant: PrivilegeGrant,
) -> Result<bool> {
    let connector = resolver.connector();
    DirectorySearch::lookup(resolver.settings().clone(), connector.as_ref(), token, false).await?;

    let (mut user, created) = resolver.users().get_or_create(token).await?;
    resolver.populate(&mut user).await?;

    if grant != PrivilegeGrant::None {
        user.grant(grant);
        user.touch();
        resolver.users().save(&user).await?;
        info!(username = %user.username, ?grant, "Granted privileges");
    }

    Ok(created)
}
