pub mod affiliate_account;
pub mod cart;
pub mod order;
pub mod order_item;
pub mod product;

pub use affiliate_account::Entity as AffiliateAccount;
pub use cart::Entity as Cart;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
