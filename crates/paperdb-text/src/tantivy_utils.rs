use tantivy::schema::{
    FacetOptions, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED,
    STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

/// Schema for one chunk per tantivy document. `id`/`doc_id` are raw terms
/// so upsert/delete can target them exactly; `title` and `text` go through
/// the BM25-scored analyzer; `published` is a fast i64 (epoch millis) for
/// range pre-filters; `category_facet` backs per-category result counts.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("doc_id", STRING | STORED);
    schema_builder.add_i64_field("ordinal", STORED);

    let text_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default()
        .set_indexing_options(text_indexing)
        .set_stored();
    schema_builder.add_text_field("title", text_options.clone());
    schema_builder.add_text_field("text", text_options);

    schema_builder.add_text_field("authors", STORED);
    schema_builder.add_text_field("category", STRING | STORED);
    schema_builder.add_facet_field("category_facet", FacetOptions::default());
    schema_builder.add_i64_field("published", INDEXED | STORED | FAST);

    schema_builder.build()
}

/// Simple tokenizer + lowercase + English stop words. Registered on both
/// the indexing and the query path so terms agree.
pub fn register_tokenizer(index: &Index) {
    let stop_words = [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not",
        "this", "these", "they", "them", "their", "there", "then", "than", "so", "if", "when",
        "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could", "should",
        "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
    ];

    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            stop_words.into_iter().map(str::to_string),
        ))
        .build();

    index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
