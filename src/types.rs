/// Column name as it appears in the parquet schema.
/// Examples: `review_body`, `review_headline_blob`, `helpful_votes`
pub type ColumnName = String;
/// Identifier for the input a batch came from (file name for parquet inputs).
/// Examples: `amazon_reviews_2015.snappy.parquet`, `memory`
pub type SourceId = String;
/// Review identifier carried through from the input.
/// Example: `R3O9SGZBVQBV76`
pub type ReviewId = String;
/// Raw, untrusted text bytes as stored in the input.
pub type RawText = Vec<u8>;
