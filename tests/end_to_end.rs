use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Float64Array, Int32Array,
    Int64Array, StringArray, UInt32Array, UInt64Array,
};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

use review_clean::sink::{report_path_for, write_report_json};
use review_clean::{
    CleanConfig, DateEncoding, InvalidTextPolicy, MemorySink, ParquetReviewSink,
    ParquetReviewSource, ParquetSourceConfig, QuantileMode, RawReviewBatch, ReviewCleaner,
    ReviewColumns, ReviewSource, TextColumn, TextValues,
};

struct Row {
    id: &'static str,
    body: &'static [u8],
    helpful: i32,
    total: i32,
    rating: i32,
}

fn write_shard(path: &Path, dates: ArrayRef, rows: &[Row]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("review_date", dates.data_type().clone(), true),
        Field::new("marketplace", DataType::Utf8, true),
        Field::new("review_id", DataType::Utf8, true),
        Field::new("product_id", DataType::Utf8, true),
        Field::new("product_category", DataType::Utf8, true),
        Field::new("star_rating", DataType::Int32, true),
        Field::new("helpful_votes", DataType::Int32, true),
        Field::new("total_votes", DataType::Int32, true),
        Field::new("vine", DataType::Boolean, true),
        Field::new("verified_purchase", DataType::Boolean, true),
        Field::new("review_headline", DataType::Utf8, true),
        Field::new("review_body_blob", DataType::Binary, true),
    ]));
    let count = rows.len();
    let columns: Vec<ArrayRef> = vec![
        dates,
        Arc::new(StringArray::from(vec!["US"; count])),
        Arc::new(StringArray::from(
            rows.iter().map(|row| row.id).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(vec!["B000TEST"; count])),
        Arc::new(StringArray::from(vec!["Books"; count])),
        Arc::new(Int32Array::from(
            rows.iter().map(|row| row.rating).collect::<Vec<_>>(),
        )),
        Arc::new(Int32Array::from(
            rows.iter().map(|row| row.helpful).collect::<Vec<_>>(),
        )),
        Arc::new(Int32Array::from(
            rows.iter().map(|row| row.total).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(vec![false; count])),
        Arc::new(BooleanArray::from(vec![true; count])),
        Arc::new(StringArray::from(vec!["  Five   stars "; count])),
        Arc::new(BinaryArray::from(
            rows.iter().map(|row| row.body).collect::<Vec<_>>(),
        )),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).expect("valid input batch");
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(path).expect("failed creating shard");
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).expect("failed opening writer");
    writer.write(&batch).expect("failed writing shard");
    writer.close().expect("failed closing shard");
}

/// Two shards: 2015 with a native DATE column, 2014 with YYYYMMDD integers.
fn write_fixture(dir: &Path) {
    let day = |y, m, d| {
        let date = NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date");
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
        (date - epoch).num_days() as i32
    };
    write_shard(
        &dir.join("amazon_reviews_2015.snappy.parquet"),
        Arc::new(Date32Array::from(vec![
            Some(day(2015, 3, 1)),
            Some(day(2015, 3, 2)),
            None,
            Some(day(2015, 3, 4)),
        ])),
        &[
            Row {
                id: "R1",
                body: b"Great  product<br />works",
                helpful: 1,
                total: 2,
                rating: 5,
            },
            Row {
                id: "R2",
                body: b"caf\xe9 latte",
                helpful: 0,
                total: 0,
                rating: 4,
            },
            Row {
                id: "R3",
                body: b"no date",
                helpful: 0,
                total: 0,
                rating: 3,
            },
            Row {
                id: "R4",
                body: b"votes disagree",
                helpful: 5,
                total: 2,
                rating: 1,
            },
        ],
    );
    write_shard(
        &dir.join("amazon_reviews_2014.snappy.parquet"),
        Arc::new(Int64Array::from(vec![Some(20230115), Some(20231301)])),
        &[
            Row {
                id: "R5",
                body: b"A much longer review body that should land in the top length bin",
                helpful: 40,
                total: 41,
                rating: 2,
            },
            Row {
                id: "R6",
                body: b"bad month",
                helpful: 0,
                total: 0,
                rating: 5,
            },
        ],
    );
}

fn read_output(path: &Path) -> RecordBatch {
    let file = File::open(path).expect("output should exist");
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).expect("valid parquet output");
    let schema = builder.schema().clone();
    let batches: Vec<RecordBatch> = builder
        .build()
        .expect("reader")
        .collect::<Result<_, _>>()
        .expect("batches");
    concat_batches(&schema, &batches).expect("concat")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> &'a T {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .as_any()
        .downcast_ref::<T>()
        .unwrap_or_else(|| panic!("unexpected type for {name}"))
}

/// Shard whose text columns are plain UTF8-annotated byte arrays holding
/// invalid bytes, as the dataset's own shards do.
fn write_utf8_annotated_shard(path: &Path) {
    let schema = parse_message_type(
        "message shard {
            required int64 review_date;
            required binary review_id (UTF8);
            required binary product_category (UTF8);
            required binary review_body (UTF8);
        }",
    )
    .expect("valid schema");
    let file = File::create(path).expect("failed creating shard");
    let props = Arc::new(WriterProperties::builder().build());
    let mut writer =
        SerializedFileWriter::new(file, Arc::new(schema), props).expect("shard writer");
    let mut row_group = writer.next_row_group().expect("row group");

    let mut dates = row_group.next_column().expect("column").expect("review_date");
    dates
        .typed::<Int64Type>()
        .write_batch(&[16_436, 16_437, 16_438], None, None)
        .expect("dates");
    dates.close().expect("close dates");

    let text: [[&[u8]; 3]; 3] = [
        [b"R1", b"R2", b"R3"],
        [b"Books", b"Books", b"Bo\xffks"],
        [b"ok", b"caf\xe9", b"fine"],
    ];
    for values in text {
        let mut column = row_group.next_column().expect("column").expect("text column");
        let values: Vec<ByteArray> = values
            .iter()
            .map(|value| ByteArray::from(value.to_vec()))
            .collect();
        column
            .typed::<ByteArrayType>()
            .write_batch(&values, None, None)
            .expect("text values");
        column.close().expect("close text");
    }
    row_group.close().expect("close row group");
    writer.close().expect("close shard");
}

fn yyyymmdd_config() -> CleanConfig {
    CleanConfig {
        date_encoding: DateEncoding::YyyyMmDd,
        ..CleanConfig::default()
    }
}

#[test]
fn directory_run_writes_cleaned_parquet_and_report() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    let data_dir = temp.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_fixture(&data_dir);

    let source = ParquetReviewSource::open(ParquetSourceConfig::new(&data_dir))
        .expect("shards should be discovered");
    assert_eq!(source.files().len(), 2);

    let out = temp.path().join("out/merged_clean.parquet");
    let text_columns = ParquetSourceConfig::new(&data_dir).text_columns;
    let mut sink = ParquetReviewSink::create(&out, &text_columns).expect("sink");
    let cleaner = ReviewCleaner::new(yyyymmdd_config()).expect("valid config");
    let report = cleaner.run(&source, &mut sink).expect("run should succeed");

    let tally = &report.tally;
    assert_eq!(tally.records_seen, 6);
    assert_eq!(tally.records_kept, 3);
    assert_eq!(tally.excluded_invalid_date, 2);
    assert_eq!(tally.excluded_vote_mismatch, 1);
    assert_eq!(tally.records_repaired, 1);
    assert_eq!(tally.invalid_sequences_replaced, 1);
    assert!(tally.is_balanced());
    assert_eq!(
        report.sources,
        vec![
            "amazon_reviews_2014.snappy.parquet".to_string(),
            "amazon_reviews_2015.snappy.parquet".to_string(),
        ]
    );

    let output = read_output(&out);
    assert_eq!(output.num_rows(), 3);

    let ids = column::<StringArray>(&output, "review_id");
    assert_eq!(
        (0..3).map(|row| ids.value(row)).collect::<Vec<_>>(),
        vec!["R5", "R1", "R2"]
    );

    let years = column::<Int32Array>(&output, "review_year");
    let months = column::<Int32Array>(&output, "review_month");
    assert_eq!((years.value(0), months.value(0)), (2023, 1));
    assert_eq!((years.value(1), months.value(1)), (2015, 3));
    let dates = column::<Date32Array>(&output, "review_date");
    assert_eq!(
        dates.value_as_date(0),
        NaiveDate::from_ymd_opt(2023, 1, 15)
    );

    let bodies = column::<StringArray>(&output, "review_body");
    assert_eq!(bodies.value(1), "Great product works");
    assert_eq!(bodies.value(2), "caf\u{FFFD} latte");
    let headlines = column::<StringArray>(&output, "review_headline");
    assert_eq!(headlines.value(0), "Five stars");

    let sources = column::<StringArray>(&output, "source_file");
    assert_eq!(sources.value(0), "amazon_reviews_2014.snappy.parquet");

    let lengths = column::<UInt64Array>(&output, "review_length");
    assert_eq!(lengths.value(1), 19);
    let capped = column::<Float64Array>(&output, "review_length_capped");
    let threshold = report.length_cutoff.threshold.expect("lengths observed");
    for row in 0..3 {
        assert!(capped.value(row) <= threshold);
    }
    let bins = column::<UInt32Array>(&output, "review_length_bin");
    assert!(bins.value(0) >= bins.value(2));
    let votes_capped = column::<Float64Array>(&output, "helpful_votes_capped");
    assert!(votes_capped.value(0) <= 40.0);
    assert!(!votes_capped.is_null(1));

    let report_path = report_path_for(&out);
    write_report_json(&report_path, &report).expect("report");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["tally"]["records_kept"], 3);
    assert_eq!(json["date_encoding"], "yyyy_mm_dd");
    assert!(json["length_bins"].as_array().is_some_and(|bins| !bins.is_empty()));
}

#[test]
fn year_selection_and_per_file_sampling_limit_rows() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    write_fixture(temp.path());
    let cleaner = ReviewCleaner::new(yyyymmdd_config()).expect("valid config");

    let mut config = ParquetSourceConfig::new(temp.path());
    config.years = vec![2015];
    let source = ParquetReviewSource::open(config).expect("2015 shard");
    assert_eq!(source.inputs(), vec!["amazon_reviews_2015.snappy.parquet".to_string()]);
    let mut sink = MemorySink::default();
    let report = cleaner.run(&source, &mut sink).expect("run");
    assert_eq!(report.tally.records_seen, 4);

    let mut config = ParquetSourceConfig::new(temp.path());
    config.rows_per_file = Some(1);
    config.sample_seed = 11;
    let source = ParquetReviewSource::open(config).expect("sampled shards");
    let seen: Vec<usize> = (0..2)
        .map(|_| {
            source
                .batches()
                .expect("batches")
                .map(|batch| batch.expect("batch").len())
                .sum()
        })
        .collect();
    assert_eq!(seen, vec![2, 2]);

    let mut config = ParquetSourceConfig::new(temp.path());
    config.years = vec![1999];
    assert!(ParquetReviewSource::open(config).is_err());
}

#[test]
fn single_invalid_byte_is_substituted_and_counted() {
    let mut columns = ReviewColumns::with_nulls(
        1,
        vec![TextColumn::raw(
            "review_body",
            vec![Some(b"Works \xff fine".to_vec())],
        )],
    );
    columns.review_id = vec![Some("R1".to_string())];
    let raw = RawReviewBatch {
        source: "memory".to_string(),
        review_date: vec![Some(20230115)],
        date_encoding: None,
        columns,
    };

    let config = CleanConfig {
        quantile_mode: QuantileMode::reservoir(),
        ..yyyymmdd_config()
    };
    let cleaner = ReviewCleaner::new(config).expect("valid config");
    let (batches, report) = cleaner.run_in_memory(vec![raw]).expect("run");

    assert_eq!(report.tally.records_repaired, 1);
    assert_eq!(report.tally.values_repaired, 1);
    let batch = &batches[0].batch;
    let date = batch.review_date[0];
    assert_eq!(date.date(), NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
    assert_eq!((date.year(), date.month()), (2023, 1));
    assert_eq!(
        batch.columns.text_column("review_body").map(|column| &column.values),
        Some(&TextValues::Normalized(vec![Some(
            "Works \u{FFFD} fine".to_string()
        )]))
    );
}

#[test]
fn invalid_bytes_in_utf8_columns_follow_the_text_policy() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    write_utf8_annotated_shard(&temp.path().join("amazon_reviews_2015.snappy.parquet"));
    let source = ParquetReviewSource::open(ParquetSourceConfig::new(temp.path())).expect("shard");

    let cleaner = ReviewCleaner::new(CleanConfig::default()).expect("valid config");
    let mut sink = MemorySink::default();
    let report = cleaner.run(&source, &mut sink).expect("invalid bytes must not fail the read");
    assert_eq!(report.tally.records_seen, 3);
    assert_eq!(report.tally.records_kept, 3);
    assert_eq!(report.tally.records_repaired, 2);
    assert_eq!(report.tally.values_repaired, 2);

    let batches = sink.into_batches();
    let columns = &batches[0].batch.columns;
    assert_eq!(
        columns.text_column("review_body").map(|column| &column.values),
        Some(&TextValues::Normalized(vec![
            Some("ok".to_string()),
            Some("caf\u{FFFD}".to_string()),
            Some("fine".to_string()),
        ]))
    );
    assert_eq!(columns.product_category[2].as_deref(), Some("Bo\u{FFFD}ks"));

    let cleaner = ReviewCleaner::new(CleanConfig {
        text_policy: InvalidTextPolicy::Drop,
        ..CleanConfig::default()
    })
    .expect("valid config");
    let mut sink = MemorySink::default();
    let report = cleaner.run(&source, &mut sink).expect("run");
    assert_eq!(report.tally.records_kept, 1);
    assert_eq!(report.tally.excluded_invalid_text, 2);
    assert_eq!(report.tally.records_repaired, 0);
    assert!(report.tally.is_balanced());
    let batches = sink.into_batches();
    assert_eq!(batches[0].batch.columns.review_id, vec![Some("R1".to_string())]);
}
