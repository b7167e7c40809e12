//! Sea-ORM entities for the keeper tables

pub mod users;
pub mod vaults;

pub use users::Entity as Users;
pub use vaults::Entity as Vaults;
