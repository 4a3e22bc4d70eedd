mod article;
mod stock;

pub use article::{ArticleFields, NewArticle};
pub use stock::{CompanyOverview, PriceBar, StockRow};
