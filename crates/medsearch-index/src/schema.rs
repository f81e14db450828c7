use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const COL_ID: &str = "id";
pub const COL_NAME: &str = "name";
pub const COL_CATEGORY: &str = "category";
/// JSON-serialized list of symptom strings, one document per row.
pub const COL_SYMPTOMS: &str = "symptoms";
pub const COL_VECTOR: &str = "vector";

pub const COL_TERM: &str = "term";
pub const COL_WEIGHT: &str = "weight";

pub fn build_diseases_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_ID, DataType::Int32, false),
		Field::new(COL_NAME, DataType::Utf8, false),
		Field::new(COL_CATEGORY, DataType::Utf8, false),
		Field::new(COL_SYMPTOMS, DataType::Utf8, false),
		Field::new(COL_VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub fn build_idf_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(COL_TERM, DataType::Utf8, false),
		Field::new(COL_WEIGHT, DataType::Float32, false),
	]))
}
