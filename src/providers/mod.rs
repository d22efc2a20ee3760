pub mod eastmoney;
pub mod gateway;
pub mod holdings;
pub mod script;
pub mod tencent;

pub use eastmoney::EastmoneyProvider;
pub use gateway::CallbackGateway;
pub use holdings::{HoldingsParser, TableRowParser};
pub use tencent::TencentQuoteProvider;
