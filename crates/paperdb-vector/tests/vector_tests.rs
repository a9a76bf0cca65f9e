use chrono::NaiveDate;
use paperdb_core::facet::FacetPredicate;
use paperdb_core::traits::VectorIndex;
use paperdb_core::types::{Chunk, DocMeta};
use paperdb_vector::LanceVectorIndex;

const DIM: usize = 8;

fn meta(category: &str, author: &str, year: i32) -> DocMeta {
    DocMeta {
        title: "paper".to_string(),
        authors: vec![author.to_string()],
        category: category.to_string(),
        published: NaiveDate::from_ymd_opt(year, 6, 1).expect("valid date"),
    }
}

fn chunk(doc_id: &str, ordinal: usize, text: &str, meta: DocMeta) -> Chunk {
    Chunk {
        id: Chunk::make_id(doc_id, ordinal),
        doc_id: doc_id.to_string(),
        ordinal,
        span: (0, text.len()),
        text: text.to_string(),
        meta,
    }
}

/// Unit vector with a 1 in one dimension; distances between such vectors
/// are fully predictable.
fn basis(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[axis] = 1.0;
    v
}

async fn seeded_index(tmp: &tempfile::TempDir) -> anyhow::Result<LanceVectorIndex> {
    let index = LanceVectorIndex::open(tmp.path(), "chunks", DIM).await?;
    let chunks = vec![
        chunk("p1", 0, "convnets", meta("cs.CV", "A. Krizhevsky", 2012)),
        chunk("p2", 0, "attention", meta("cs.CL", "A. Vaswani", 2017)),
        chunk("p3", 0, "boosting", meta("stat.ML", "T. Chen", 2016)),
    ];
    let embeddings = vec![basis(0), basis(1), basis(2)];
    index.upsert(&chunks, &embeddings).await?;
    Ok(index)
}

#[tokio::test]
async fn nearest_neighbor_comes_back_first() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = seeded_index(&tmp).await?;

    let hits = index.query(&basis(1), 3, None).await?;
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk_id, "p2:0");
    assert!(hits[0].score > hits[1].score);
    assert_eq!(hits[0].stored.meta.category, "cs.CL");
    Ok(())
}

#[tokio::test]
async fn upsert_same_id_replaces_vector() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = seeded_index(&tmp).await?;

    // Re-point p3 at axis 3; the old axis-2 vector must be gone.
    index
        .upsert(
            &[chunk("p3", 0, "boosting v2", meta("stat.ML", "T. Chen", 2016))],
            &[basis(3)],
        )
        .await?;
    let hits = index.query(&basis(2), 3, None).await?;
    assert!(hits[0].chunk_id != "p3:0");
    let hits = index.query(&basis(3), 1, None).await?;
    assert_eq!(hits[0].chunk_id, "p3:0");
    assert_eq!(hits[0].stored.text, "boosting v2");
    Ok(())
}

#[tokio::test]
async fn sql_pushdown_filters_candidates() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = seeded_index(&tmp).await?;

    let filter = FacetPredicate::Eq { field: "category".to_string(), value: "cs.CV".to_string() };
    let hits = index.query(&basis(1), 3, Some(&filter)).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "p1:0");

    let filter = FacetPredicate::Eq { field: "author".to_string(), value: "VASWANI".to_string() };
    let hits = index.query(&basis(1), 3, Some(&filter)).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_id, "p2:0");

    let filter = FacetPredicate::DateRange {
        from: Some(NaiveDate::from_ymd_opt(2015, 1, 1).expect("valid date")),
        to: None,
    };
    let hits = index.query(&basis(0), 3, Some(&filter)).await?;
    assert!(hits.iter().all(|h| h.chunk_id != "p1:0"));
    assert_eq!(hits.len(), 2);
    Ok(())
}

#[tokio::test]
async fn delete_document_and_chunk() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = seeded_index(&tmp).await?;

    index.delete_document("p1").await?;
    let hits = index.query(&basis(0), 3, None).await?;
    assert!(hits.iter().all(|h| h.stored.doc_id != "p1"));

    index.delete_chunk("p2:0").await?;
    let hits = index.query(&basis(1), 3, None).await?;
    assert!(hits.iter().all(|h| h.chunk_id != "p2:0"));
    Ok(())
}

#[tokio::test]
async fn dimension_mismatch_is_rejected_before_write() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let index = LanceVectorIndex::open(tmp.path(), "chunks", DIM).await?;
    let result = index
        .upsert(
            &[chunk("p1", 0, "text", meta("cs.CV", "A", 2020))],
            &[vec![0.0; DIM + 1]],
        )
        .await;
    assert!(result.is_err());
    let hits = index.query(&basis(0), 1, None).await?;
    assert!(hits.is_empty());
    Ok(())
}
