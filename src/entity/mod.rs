pub mod audit_logs;
pub mod cart_items;
pub mod locations;
pub mod order_products;
pub mod orders;
pub mod products;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use locations::Entity as Locations;
pub use order_products::Entity as OrderProducts;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use users::Entity as Users;
