//! Identity records, role assignments and person relations.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::upsert::UpsertPlan;
use super::{OfferingMap, SyncContext, SyncError, SyncResult};
use crate::models::{Id, Identity, OfferingKey, Person, Role, Tenant};
use crate::store::StoreError;

/// Normalizes a phone number to `+<country><number>` form.
///
/// Separators are dropped, a leading `00` becomes `+`, and numbers without
/// an international prefix get the tenant's country code.
pub fn normalize_phone(raw: &str, country_code: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }

    if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else if let Some(rest) = digits.strip_prefix("00") {
        format!("+{}", rest)
    } else {
        let prefix: String = country_code
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        format!("+{}{}", prefix, digits)
    }
}

/// Login name of an identity: `<tenant>_<phone digits>`, plus
/// `_<order>` for dependents sharing a guardian's phone.
pub fn user_name(tenant_code: &str, phone: &str, dependence_order: i32) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if dependence_order > 0 {
        format!("{}_{}_{}", tenant_code, digits, dependence_order)
    } else {
        format!("{}_{}", tenant_code, digits)
    }
}

pub fn hash_password(user_name: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_name.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Person-side bookkeeping for one tenant.
pub(crate) struct Linker<'a> {
    ctx: &'a SyncContext,
    pub tenant: &'a Tenant,
    offerings: &'a OfferingMap,
}

impl<'a> Linker<'a> {
    pub fn new(ctx: &'a SyncContext, tenant: &'a Tenant, offerings: &'a OfferingMap) -> Self {
        Self {
            ctx,
            tenant,
            offerings,
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        normalize_phone(raw, &self.tenant.phone_country_code)
    }

    /// Finds or creates the identity record for `phone`.
    pub async fn put_identity(&self, phone: &str, dependence_order: i32) -> SyncResult<Identity> {
        let identities = &self.ctx.store.identities;
        let name = user_name(&self.tenant.code, phone, dependence_order);

        match identities.find_by_user_name(&name).await? {
            Some(mut identity) => {
                if identity.phone != phone {
                    identity.phone = phone.to_string();
                    identity.phone_confirmed = false;
                    return Ok(identities.update_identity(identity).await?);
                }
                Ok(identity)
            }
            None => match identities.create_identity(Identity::new(name.clone(), phone)).await {
                Ok(identity) => {
                    if self.ctx.options.verbose {
                        tracing::info!("Created identity {}", identity.user_name);
                    }
                    Ok(identity)
                }
                // Another phase created it in the meantime
                Err(StoreError::DuplicateKey { .. }) => identities
                    .find_by_user_name(&name)
                    .await?
                    .ok_or_else(|| SyncError::Record {
                        title: name,
                        message: "identity vanished while being created".to_string(),
                    }),
                Err(e) => Err(e.into()),
            },
        }
    }

    pub async fn put_person(
        &self,
        identity: &Identity,
        first_name: &str,
        last_name: &str,
        dependence_order: i32,
        title: &str,
    ) -> SyncResult<Person> {
        let mut person = Person::new(
            identity.id,
            first_name.trim(),
            last_name.trim(),
            identity.phone.clone(),
        );
        person.dependence_order = dependence_order;

        let people = self.ctx.store.people.as_ref();
        let mut plan = UpsertPlan::new();
        plan.stage(title, person.clone());
        let applied = match plan.apply(people, self.ctx.options.verbose).await {
            // Another phase created the same person in the meantime, so
            // the second attempt turns into an update
            Err(SyncError::Store(StoreError::DuplicateKey { .. })) => {
                let mut plan = UpsertPlan::new();
                plan.stage(title, person);
                plan.apply(people, self.ctx.options.verbose).await?
            }
            result => result?,
        };

        applied
            .into_rows()
            .pop()
            .ok_or_else(|| SyncError::Record {
                title: title.to_string(),
                message: format!("person for {} was not written", identity.user_name),
            })
    }

    /// Makes `role` the person's role in its category.
    ///
    /// Roles that may not coexist with `role` are removed, `none` included.
    pub async fn assign_role(&self, person: Id, role: Role) -> SyncResult<()> {
        let links = &self.ctx.store.links;
        let current = links.roles(person).await?;

        let stale: Vec<Role> = current
            .iter()
            .copied()
            .filter(|r| *r != role && !role.may_coexist_with(*r))
            .collect();
        if !stale.is_empty() {
            tracing::debug!("Removing roles {:?} from person {}", stale, person);
            links.remove_roles(person, &stale).await?;
        }

        if !current.contains(&role) {
            links.assign_roles(person, &[role]).await?;
        }
        Ok(())
    }

    /// Gives back-office roles the default password when they have none.
    pub async fn set_default_password(&self, identity: Identity, role: Role) -> SyncResult<()> {
        if !role.is_backend() || identity.password_hash.is_some() {
            return Ok(());
        }
        let Some(password) = self.ctx.options.default_password.as_deref() else {
            tracing::warn!(
                "No default password configured for back-office user {}",
                identity.user_name
            );
            return Ok(());
        };

        let mut identity = identity;
        identity.password_hash = Some(hash_password(&identity.user_name, password));
        self.ctx.store.identities.update_identity(identity).await?;
        Ok(())
    }

    pub async fn link_tenant(&self, person: Id) -> SyncResult<()> {
        let links = &self.ctx.store.links;
        if !links.tenants(person).await?.contains(&self.tenant.id) {
            links.add_tenant(person, self.tenant.id).await?;
        }
        Ok(())
    }

    /// Makes the person's enrollments in this tenant match `codes`.
    ///
    /// An empty list enrolls the person in every offering of the tenant.
    /// Enrollments in other tenants are left alone.
    pub async fn sync_enrollments(
        &self,
        person: Id,
        codes: &[String],
        title: &str,
    ) -> SyncResult<()> {
        let links = &self.ctx.store.links;
        let tenant_offerings: HashSet<Id> =
            self.offerings.ids_in(self.tenant.id).into_iter().collect();

        let requested: HashSet<Id> = if codes.is_empty() {
            tenant_offerings.clone()
        } else {
            codes
                .iter()
                .filter_map(|code| {
                    let key = OfferingKey::new(self.tenant.id, code.trim());
                    let id = self.offerings.id_of(&key);
                    if id.is_none() {
                        tracing::error!(
                            "Unknown offering {} requested by \"{}\", skipping it",
                            code,
                            title
                        );
                    }
                    id
                })
                .collect()
        };

        let current: HashSet<Id> = links
            .offerings(person)
            .await?
            .into_iter()
            .filter(|id| tenant_offerings.contains(id))
            .collect();

        let mut add: Vec<Id> = requested.difference(&current).copied().collect();
        let mut remove: Vec<Id> = current.difference(&requested).copied().collect();
        add.sort_unstable();
        remove.sort_unstable();

        if !add.is_empty() {
            links.enroll(person, &add).await?;
        }
        if !remove.is_empty() {
            links.unenroll(person, &remove).await?;
        }
        Ok(())
    }

    pub async fn link_dependent(&self, guardian: Id, dependent: Id) -> SyncResult<()> {
        let links = &self.ctx.store.links;
        if !links.dependents(guardian).await?.contains(&dependent) {
            links.link_dependent(guardian, dependent).await?;
        }
        Ok(())
    }
}
