pub mod loader;
pub mod types;

pub use loader::{dataframe_to_dataset, era_ordinals, parse_era, DataLoader, LoadOptions, LoaderError};
pub use types::{EraDataset, FoldData};
