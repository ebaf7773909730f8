//! Bulk question import from spreadsheets.
//!
//! The first worksheet (or the whole file, for CSV) is read as a table whose
//! first row names the columns. Each following row becomes one question
//! draft, or a list of [`RowError`]s explaining why it was rejected.

use std::{io::Cursor, path::Path};

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::{
    database::model::{Difficulty, OptionLetter, QuestionDraft, QuestionSource},
    error::ImportError,
    import::text::DEFAULT_CATEGORY,
};

pub const MAX_SHEET_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based spreadsheet row; the header is row 1.
    pub row: usize,
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SheetReport {
    pub questions: Vec<QuestionDraft>,
    pub errors: Vec<RowError>,
    pub total_rows: usize,
    pub valid_rows: usize,
}

impl SheetReport {
    pub fn invalid_rows(&self) -> usize {
        self.total_rows - self.valid_rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetFormat {
    Csv,
    Workbook,
}

fn detect_format(file_name: &str) -> Result<SheetFormat, ImportError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => Ok(SheetFormat::Csv),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(SheetFormat::Workbook),
        _ => Err(ImportError::UnsupportedFormat(file_name.to_owned())),
    }
}

pub fn parse_sheet(file_name: &str, bytes: Vec<u8>) -> Result<SheetReport, ImportError> {
    if bytes.len() > MAX_SHEET_BYTES {
        return Err(ImportError::Spreadsheet(format!(
            "file is larger than {} bytes",
            MAX_SHEET_BYTES
        )));
    }

    let rows = match detect_format(file_name)? {
        SheetFormat::Csv => read_csv_rows(bytes)?,
        SheetFormat::Workbook => read_workbook_rows(bytes)?,
    };

    parse_rows(rows)
}

fn read_csv_rows(bytes: Vec<u8>) -> Result<Vec<Vec<String>>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(Cursor::new(bytes));

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(rows)
}

fn read_workbook_rows(bytes: Vec<u8>) -> Result<Vec<Vec<String>>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::MissingHeader)?
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{:.0}", f),
        other => other.to_string(),
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Default)]
struct Columns {
    question: Option<usize>,
    options: [Option<usize>; 4],
    correct_letter: Option<usize>,
    correct_index: Option<usize>,
    correct_either: Option<usize>,
    difficulty: Option<usize>,
    topic: Option<usize>,
}

fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Columns {
    fn resolve(header: &[String]) -> Result<Self, ImportError> {
        let mut columns = Columns::default();
        for (idx, name) in header.iter().enumerate() {
            match normalize_header(name).as_str() {
                "questiontext" | "question" => columns.question.get_or_insert(idx),
                "optiona" | "option1" => columns.options[0].get_or_insert(idx),
                "optionb" | "option2" => columns.options[1].get_or_insert(idx),
                "optionc" | "option3" => columns.options[2].get_or_insert(idx),
                "optiond" | "option4" => columns.options[3].get_or_insert(idx),
                "correctanswer" => columns.correct_letter.get_or_insert(idx),
                "correctindex" => columns.correct_index.get_or_insert(idx),
                "correctoption" | "correct" => columns.correct_either.get_or_insert(idx),
                "difficulty" => columns.difficulty.get_or_insert(idx),
                "topic" | "category" => columns.topic.get_or_insert(idx),
                _ => continue,
            };
        }

        if columns.question.is_none() {
            return Err(ImportError::MissingColumn("Question Text"));
        }
        for (slot, name) in columns
            .options
            .iter()
            .zip(["Option A", "Option B", "Option C", "Option D"])
        {
            if slot.is_none() {
                return Err(ImportError::MissingColumn(name));
            }
        }
        if columns.correct_letter.is_none()
            && columns.correct_index.is_none()
            && columns.correct_either.is_none()
        {
            return Err(ImportError::MissingColumn("Correct Answer"));
        }
        Ok(columns)
    }
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("")
}

const OPTION_FIELDS: [&str; 4] = ["Option A", "Option B", "Option C", "Option D"];

fn parse_rows(rows: Vec<Vec<String>>) -> Result<SheetReport, ImportError> {
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(ImportError::MissingHeader)?;
    let columns = Columns::resolve(&header)?;

    let mut report = SheetReport::default();

    for (idx, row) in rows.enumerate() {
        let row_number = idx + 2;
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        report.total_rows += 1;

        let mut row_errors = Vec::new();
        let mut error = |field: &'static str, message: String| {
            row_errors.push(RowError {
                row: row_number,
                field,
                message,
            })
        };

        let text = cell(&row, columns.question);
        if text.is_empty() {
            error("Question Text", "Question text is required".into());
        }

        let mut options: [String; 4] = Default::default();
        for (i, field) in OPTION_FIELDS.into_iter().enumerate() {
            let value = cell(&row, columns.options[i]);
            if value.is_empty() {
                error(field, format!("{field} is required"));
            }
            options[i] = value.to_owned();
        }

        let correct = resolve_correct(&row, &columns);
        if correct.is_none() {
            error(
                "Correct Answer",
                "Correct answer must be A, B, C, or D".into(),
            );
        }

        let raw_difficulty = cell(&row, columns.difficulty);
        let difficulty = if raw_difficulty.is_empty() {
            Some(Difficulty::default())
        } else {
            raw_difficulty.parse::<Difficulty>().ok()
        };
        if difficulty.is_none() {
            error(
                "Difficulty",
                "Difficulty must be easy, medium, or hard".into(),
            );
        }

        if !row_errors.is_empty() {
            tracing::debug!(row = row_number, errors = row_errors.len(), "rejecting sheet row");
            report.errors.extend(row_errors);
            continue;
        }

        let (Some(correct), Some(difficulty)) = (correct, difficulty) else {
            continue;
        };

        let topic = cell(&row, columns.topic);
        report.questions.push(QuestionDraft {
            text: text.to_owned(),
            options,
            correct,
            difficulty,
            topic: if topic.is_empty() {
                DEFAULT_CATEGORY.to_owned()
            } else {
                topic.to_owned()
            },
            source: QuestionSource::Excel,
        });
        report.valid_rows += 1;
    }

    Ok(report)
}

fn correct_from_index(raw: &str) -> Option<OptionLetter> {
    raw.parse::<usize>().ok().and_then(OptionLetter::from_index)
}

fn resolve_correct(row: &[String], columns: &Columns) -> Option<OptionLetter> {
    let letter = cell(row, columns.correct_letter);
    if !letter.is_empty() {
        return OptionLetter::from_letter(letter);
    }
    let index = cell(row, columns.correct_index);
    if !index.is_empty() {
        return correct_from_index(index);
    }
    // a letter or a 0-based index
    let either = cell(row, columns.correct_either);
    OptionLetter::from_letter(either).or_else(|| correct_from_index(either))
}

/// Header row written by [`template_csv`].
pub const TEMPLATE_HEADERS: [&str; 8] = [
    "Question Text",
    "Option A",
    "Option B",
    "Option C",
    "Option D",
    "Correct Answer",
    "Difficulty",
    "Topic",
];

/// A CSV template with the accepted header names and two sample rows.
pub fn template_csv() -> Result<String, ImportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADERS)?;
    writer.write_record([
        "What is the capital of France?",
        "London",
        "Paris",
        "Berlin",
        "Madrid",
        "B",
        "easy",
        "Geography",
    ])?;
    writer.write_record([
        "Which planet is known as the Red Planet?",
        "Venus",
        "Jupiter",
        "Mars",
        "Saturn",
        "C",
        "easy",
        "Astronomy",
    ])?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| ImportError::Spreadsheet(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(text: &str) -> SheetReport {
        parse_sheet("questions.csv", text.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn template_round_trips_through_the_parser() {
        let template = template_csv().unwrap();
        let report = csv(&template);

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.valid_rows, 2);
        assert!(report.errors.is_empty());
        assert_eq!(report.questions[0].correct, OptionLetter::B);
        assert_eq!(report.questions[1].topic, "Astronomy");
        assert_eq!(report.questions[1].source, QuestionSource::Excel);
    }

    #[test]
    fn legacy_headers_with_zero_based_index_are_accepted() {
        let report = csv(
            "question,option1,option2,option3,option4,correct_index,category\n\
             2 + 2?,3,4,5,6,1,Math\n",
        );
        assert_eq!(report.valid_rows, 1);
        let q = &report.questions[0];
        assert_eq!(q.correct, OptionLetter::B);
        assert_eq!(q.topic, "Math");
        assert_eq!(q.difficulty, Difficulty::Medium);
    }

    #[test]
    fn advertised_upload_columns_are_accepted() {
        let header = TEMPLATE_HEADERS.join(",");
        let report = csv(&format!("{header}\n2 + 2?,3,4,5,6,B,easy,Math\n"));
        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.questions[0].correct, OptionLetter::B);
    }

    #[test]
    fn snake_case_correct_option_takes_letter_or_index() {
        let report = csv(
            "question,option_a,option_b,option_c,option_d,correct_option,difficulty,topic\n\
             2 + 2?,3,4,5,6,B,easy,Math\n\
             3 + 3?,5,6,7,8,1,medium,Math\n\
             4 + 4?,6,7,8,9,7,hard,Math\n",
        );
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.valid_rows, 2);
        assert_eq!(report.questions[0].correct, OptionLetter::B);
        assert_eq!(report.questions[1].correct, OptionLetter::B);
        assert_eq!(report.errors[0].row, 4);
        assert_eq!(report.errors[0].field, "Correct Answer");
    }

    #[test]
    fn invalid_rows_collect_every_error_with_sheet_row_numbers() {
        let report = csv(
            "Question Text,Option A,Option B,Option C,Option D,Correct Answer,Difficulty\n\
             Fine question?,a,b,c,d,a,hard\n\
             ,a,,c,d,E,extreme\n",
        );

        assert_eq!(report.total_rows, 2);
        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.invalid_rows(), 1);

        let fields: Vec<_> = report.errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["Question Text", "Option B", "Correct Answer", "Difficulty"]
        );
        assert!(report.errors.iter().all(|e| e.row == 3));
        assert_eq!(report.questions[0].difficulty, Difficulty::Hard);
    }

    #[test]
    fn blank_rows_are_not_counted() {
        let report = csv(
            "Question Text,Option A,Option B,Option C,Option D,Correct Answer\n\
             ,,,,,\n\
             Q?,a,b,c,d,D\n",
        );
        assert_eq!(report.total_rows, 1);
        assert_eq!(report.questions[0].correct, OptionLetter::D);
    }

    #[test]
    fn missing_correct_column_is_a_file_level_error() {
        let err = parse_sheet(
            "q.csv",
            b"Question Text,Option A,Option B,Option C,Option D\n".to_vec(),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn("Correct Answer")));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let err = parse_sheet("notes.txt", b"hello".to_vec()).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }

    #[test]
    fn empty_file_has_no_header() {
        let err = parse_sheet("empty.csv", Vec::new()).unwrap_err();
        assert!(matches!(err, ImportError::MissingHeader));
    }
}
