use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{User, UserRole};
use crate::error::{AppError, AppResult};

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user UUID
    pub iat: usize,
    pub exp: usize,
}

/// Actions a route can require. Each maps to the roles allowed to perform it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageUsers,
    ManageNurseries,
    ViewMonthlyPlan,
    WriteReview,
    EditReview,
    ManageServices,
    RegisterChild,
    EditChild,
}

impl Permission {
    pub fn allowed_roles(self) -> &'static [UserRole] {
        use UserRole::*;
        match self {
            Permission::ManageUsers | Permission::ManageServices => &[Admin],
            Permission::ManageNurseries | Permission::ViewMonthlyPlan => &[Admin, NurseryOwner],
            Permission::WriteReview => &[Parent],
            Permission::EditReview | Permission::RegisterChild | Permission::EditChild => {
                &[Parent, Admin]
            }
        }
    }

    pub fn allows(self, role: UserRole) -> bool {
        self.allowed_roles().contains(&role)
    }
}

/// The active user behind a verified bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }

    pub fn authorize(&self, permission: Permission) -> AppResult<()> {
        if permission.allows(self.role()) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_table() {
        use UserRole::*;
        assert!(Permission::ManageUsers.allows(Admin));
        assert!(!Permission::ManageUsers.allows(NurseryOwner));
        assert!(Permission::ManageNurseries.allows(NurseryOwner));
        assert!(!Permission::ManageNurseries.allows(Parent));
        assert!(Permission::WriteReview.allows(Parent));
        assert!(!Permission::WriteReview.allows(Admin));
        assert!(Permission::EditReview.allows(Admin));
        assert!(!Permission::ManageServices.allows(Parent));
        assert!(Permission::RegisterChild.allows(Parent));
        assert!(!Permission::EditChild.allows(NurseryOwner));
    }
}
