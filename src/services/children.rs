use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        child::{check_birth_date, Child, ChildView, CreateChildRequest, UpdateChildRequest},
        user::UserRole,
    },
    services::{
        nurseries::NurseryService,
        query_features::{Column, ColumnKind, QueryFeatures, Resource},
    },
};

pub static CHILD_RESOURCE: Resource = Resource {
    columns: &[
        Column { field: "firstName", sql: "c.first_name", kind: ColumnKind::Text },
        Column { field: "lastName", sql: "c.last_name", kind: ColumnKind::Text },
        Column { field: "dateOfBirth", sql: "c.date_of_birth", kind: ColumnKind::Date },
        Column { field: "gender", sql: "c.gender", kind: ColumnKind::Text },
        Column { field: "parent", sql: "c.parent_id", kind: ColumnKind::Uuid },
        Column { field: "nursery", sql: "c.nursery_id", kind: ColumnKind::Uuid },
        Column {
            field: "preferredCommunicationMethod",
            sql: "c.preferred_communication_method",
            kind: ColumnKind::Text,
        },
        Column { field: "createdAt", sql: "c.created_at", kind: ColumnKind::Timestamp },
    ],
    created_at: "c.created_at",
    id: "c.id",
};

const CHILD_SELECT: &str =
    "SELECT c.* FROM children c JOIN nurseries n ON n.id = c.nursery_id WHERE TRUE";

/// Restricts a query to the children the actor may see: admins see all,
/// nursery owners the children enrolled in their nurseries, parents their own.
fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, actor: &AuthenticatedUser) {
    match actor.role() {
        UserRole::Admin => {}
        UserRole::NurseryOwner => {
            qb.push(" AND n.owner_id = ");
            qb.push_bind(actor.id());
        }
        UserRole::Parent => {
            qb.push(" AND c.parent_id = ");
            qb.push_bind(actor.id());
        }
    }
}

pub fn ensure_can_edit(actor: &AuthenticatedUser, child: &Child) -> AppResult<()> {
    if actor.is_admin() || child.parent_id == actor.id() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub struct ChildService;

impl ChildService {
    pub async fn list(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        features: &QueryFeatures,
    ) -> AppResult<Vec<ChildView>> {
        let mut qb = QueryBuilder::new(CHILD_SELECT);
        push_scope(&mut qb, actor);
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        let children = qb.build_query_as::<Child>().fetch_all(pool).await?;
        Ok(children.into_iter().map(ChildView::from).collect())
    }

    async fn find_visible(pool: &PgPool, actor: &AuthenticatedUser, id: Uuid) -> AppResult<Child> {
        let mut qb = QueryBuilder::new(CHILD_SELECT);
        qb.push(" AND c.id = ");
        qb.push_bind(id);
        push_scope(&mut qb, actor);
        qb.build_query_as::<Child>()
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("child"))
    }

    pub async fn get(pool: &PgPool, actor: &AuthenticatedUser, id: Uuid) -> AppResult<ChildView> {
        Ok(Self::find_visible(pool, actor, id).await?.into())
    }

    /// Parents register their own children; admins must name the parent.
    pub async fn create(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        req: &CreateChildRequest,
    ) -> AppResult<ChildView> {
        req.validate()?;
        check_birth_date(req.date_of_birth, Utc::now().date_naive()).map_err(AppError::Validation)?;

        let parent_id = if actor.is_admin() {
            req.parent.ok_or_else(|| {
                AppError::Validation("Children must belong to a Parent.".to_string())
            })?
        } else {
            actor.id()
        };
        NurseryService::find(pool, req.nursery).await?;

        let child = sqlx::query_as::<_, Child>(
            "INSERT INTO children
                (first_name, last_name, date_of_birth, gender, medical_information, parent_id,
                 preferred_communication_method, nursery_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.date_of_birth)
        .bind(req.gender.to_string())
        .bind(req.medical_information.clone().unwrap_or_default())
        .bind(parent_id)
        .bind(
            req.preferred_communication_method
                .map(|m| m.to_string())
                .unwrap_or_else(|| "phone".to_string()),
        )
        .bind(req.nursery)
        .fetch_one(pool)
        .await?;

        tracing::info!(child_id = %child.id, %parent_id, "Child registered");
        Ok(child.into())
    }

    pub async fn update(
        pool: &PgPool,
        actor: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateChildRequest,
    ) -> AppResult<ChildView> {
        req.validate()?;
        if let Some(dob) = req.date_of_birth {
            check_birth_date(dob, Utc::now().date_naive()).map_err(AppError::Validation)?;
        }
        let current = Self::find_visible(pool, actor, id).await?;
        ensure_can_edit(actor, &current)?;
        if let Some(nursery_id) = req.nursery {
            NurseryService::find(pool, nursery_id).await?;
        }

        let child = sqlx::query_as::<_, Child>(
            "UPDATE children
             SET first_name                     = COALESCE($1, first_name),
                 last_name                      = COALESCE($2, last_name),
                 date_of_birth                  = COALESCE($3, date_of_birth),
                 gender                         = COALESCE($4, gender),
                 medical_information            = COALESCE($5, medical_information),
                 preferred_communication_method = COALESCE($6, preferred_communication_method),
                 nursery_id                     = COALESCE($7, nursery_id),
                 version                        = version + 1
             WHERE id = $8
             RETURNING *",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.date_of_birth)
        .bind(req.gender.map(|g| g.to_string()))
        .bind(&req.medical_information)
        .bind(req.preferred_communication_method.map(|m| m.to_string()))
        .bind(req.nursery)
        .bind(current.id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("child"))?;

        Ok(child.into())
    }

    pub async fn delete(pool: &PgPool, actor: &AuthenticatedUser, id: Uuid) -> AppResult<()> {
        let current = Self::find_visible(pool, actor, id).await?;
        ensure_can_edit(actor, &current)?;

        sqlx::query("DELETE FROM children WHERE id = $1")
            .bind(current.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;

    fn actor(role: &str) -> AuthenticatedUser {
        AuthenticatedUser {
            user: User {
                id: Uuid::new_v4(),
                first_name: "Omar".into(),
                last_name: "Said".into(),
                email: "omar@example.com".into(),
                address: "Giza".into(),
                role: role.into(),
                gender: "male".into(),
                photo: "default.jpeg".into(),
                password_hash: String::new(),
                password_changed_at: None,
                password_reset_token: None,
                password_reset_expires: None,
                active: true,
                version: 0,
                created_at: Utc::now(),
            },
        }
    }

    fn scoped_sql(actor: &AuthenticatedUser) -> String {
        let mut qb = QueryBuilder::<Postgres>::new(CHILD_SELECT);
        push_scope(&mut qb, actor);
        qb.sql().to_string()
    }

    #[test]
    fn scope_depends_on_role() {
        assert!(scoped_sql(&actor("admin")).ends_with("WHERE TRUE"));
        assert!(scoped_sql(&actor("nursery-owner")).ends_with("AND n.owner_id = $1"));
        assert!(scoped_sql(&actor("parent")).ends_with("AND c.parent_id = $1"));
    }

    #[test]
    fn only_the_parent_or_an_admin_edits_a_child() {
        let parent = actor("parent");
        let child = Child {
            id: Uuid::new_v4(),
            first_name: "Yassin".into(),
            last_name: "Said".into(),
            date_of_birth: chrono::NaiveDate::from_ymd_opt(2021, 5, 26).unwrap(),
            gender: "male".into(),
            medical_information: vec![],
            parent_id: parent.id(),
            preferred_communication_method: "phone".into(),
            nursery_id: Uuid::new_v4(),
            version: 0,
            created_at: Utc::now(),
        };
        assert!(ensure_can_edit(&parent, &child).is_ok());
        assert!(ensure_can_edit(&actor("admin"), &child).is_ok());
        assert!(ensure_can_edit(&actor("parent"), &child).is_err());
    }
}
