pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod memory;
pub mod models;
pub mod pricing;
pub mod reports;
pub mod repository;
pub mod requests;
pub mod shipping;
pub mod sweeper;

pub use error::{OrderError, OrderResult};
pub use manager::{EngineSettings, OrderManager};
pub use memory::InMemoryOrderRepository;
pub use models::{Order, OrderItem, OrderStatus, ShippingMethod};
pub use reports::{DashboardStats, ExportQuery, ExportRow, OrderListing, OrderQuery, OrderStats};
pub use repository::{OrderFilter, OrderPage, OrderRepository, StatusTotals, StatusUpdate};
pub use requests::{CreateOrderRequest, EditOrderRequest, LineItemInput};
pub use sweeper::AutoDeliverySweeper;
