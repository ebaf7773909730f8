use std::{
    fs,
    io::{Cursor, Write},
};

use quizdeck::{
    database::model::{Difficulty, OptionLetter, QuestionSource},
    error::ImportError,
    import::{
        draft_from_parsed,
        ocr::TextRecognizer,
        sheet::{parse_sheet, template_csv},
        text::parse_questions_from_text,
        ParsedQuestion,
    },
    validation,
};

struct CannedRecognizer(&'static str);

impl TextRecognizer for CannedRecognizer {
    async fn recognize(&self, _image: Vec<u8>) -> Result<String, ImportError> {
        Ok(self.0.to_owned())
    }
}

const PAGE: &str = "Biology quiz, unit 2\n\
    1. Which organelle produces energy?\n\
    a) Nucleus\n\
    b) Mitochondria\n\
    c) Ribosome\n\
    d) Golgi body\n\
    2. Which gas do plants absorb?\n\
    a) Oxygen\n\
    b) Nitrogen\n\
    3. What carries genetic information?\n\
    a. DNA\n\
    b. ATP\n\
    c. Glucose\n\
    d. Water\n";

#[tokio::test]
async fn recognised_page_becomes_reviewed_drafts() {
    let text = CannedRecognizer(PAGE).recognize(vec![0xFF, 0xD8]).await.unwrap();

    let parsed = parse_questions_from_text(&text);
    assert_eq!(parsed.len(), 3);

    let complete: Vec<ParsedQuestion> = parsed.into_iter().filter(ParsedQuestion::is_complete).collect();
    assert_eq!(complete.len(), 2);

    let drafts: Vec<_> = complete
        .iter()
        .zip([OptionLetter::B, OptionLetter::A])
        .map(|(parsed, correct)| validation::question_draft(draft_from_parsed(parsed, correct)).unwrap())
        .collect();

    assert_eq!(drafts[0].text, "Which organelle produces energy?");
    assert_eq!(drafts[0].option(drafts[0].correct), "Mitochondria");
    assert_eq!(drafts[1].option(drafts[1].correct), "DNA");
    assert!(drafts.iter().all(|d| d.source == QuestionSource::Ocr));
    assert!(drafts.iter().all(|d| d.difficulty == Difficulty::Medium));
    assert!(drafts.iter().all(|d| d.topic == "General"));
}

#[test]
fn spreadsheet_file_on_disk_is_imported() {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .unwrap();
    write!(
        file,
        "Question Text,Option A,Option B,Option C,Option D,Correct Answer,Difficulty,Topic\n\
         What is H2O?,Salt,Water,Sugar,Air,B,easy,Chemistry\n\
         Speed of light?,300 km/s,300000 km/s,3 km/s,30 km/s,b,HARD,Physics\n\
         Broken row,only one option,,,,Z,medium,\n"
    )
    .unwrap();

    let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
    let bytes = fs::read(file.path()).unwrap();
    let report = parse_sheet(&name, bytes).unwrap();

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.valid_rows, 2);
    assert_eq!(report.invalid_rows(), 1);
    assert_eq!(report.questions[1].difficulty, Difficulty::Hard);
    assert_eq!(report.questions[1].correct, OptionLetter::B);
    assert!(report.errors.iter().all(|e| e.row == 4));
    assert!(report.errors.iter().any(|e| e.field == "Correct Answer"));
}

#[test]
fn template_is_a_valid_upload() {
    let template = template_csv().unwrap();
    let report = parse_sheet("questions_template.csv", template.into_bytes()).unwrap();
    assert_eq!(report.valid_rows, report.total_rows);
    assert!(report
        .questions
        .into_iter()
        .all(|draft| validation::question_draft(draft).is_ok()));
}

/// Writes a workbook whose first sheet holds questions and whose second
/// sheet holds unrelated notes.
fn workbook(rows: &[[Cell; 6]]) -> Vec<u8> {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();
    sheet.set_name("Questions");
    for (col, header) in ["Question", "Option1", "Option2", "Option3", "Option4", "CorrectIndex"]
        .iter()
        .enumerate()
    {
        sheet.get_cell_mut((col as u32 + 1, 1)).set_value(*header);
    }
    for (row, cells) in rows.iter().enumerate() {
        for (col, value) in cells.iter().enumerate() {
            let cell = sheet.get_cell_mut((col as u32 + 1, row as u32 + 2));
            match value {
                Cell::Text(text) => {
                    cell.set_value(*text);
                }
                Cell::Number(n) => {
                    cell.set_value_number(*n);
                }
            }
        }
    }

    let notes = book.new_sheet("Notes").unwrap();
    notes.get_cell_mut((1, 1)).set_value("not a question sheet");

    let mut buf = Cursor::new(Vec::new());
    umya_spreadsheet::writer::xlsx::write_writer(&book, &mut buf).unwrap();
    buf.into_inner()
}

enum Cell {
    Text(&'static str),
    Number(f64),
}

#[test]
fn workbook_first_sheet_is_imported_with_numeric_cells() {
    use Cell::{Number, Text};

    let bytes = workbook(&[
        [Text("2 + 2?"), Number(3.0), Number(4.0), Number(5.0), Number(6.0), Number(1.0)],
        [Text("Largest ocean?"), Text("Atlantic"), Text("Indian"), Text("Arctic"), Text("Pacific"), Number(3.0)],
        [Text("Out of range?"), Text("a"), Text("b"), Text("c"), Text("d"), Number(4.0)],
    ]);

    let report = parse_sheet("upload.xlsx", bytes).unwrap();

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.valid_rows, 2);
    assert_eq!(report.questions[0].options[1], "4");
    assert_eq!(report.questions[0].correct, OptionLetter::B);
    assert_eq!(report.questions[1].correct, OptionLetter::D);
    assert!(report.questions.iter().all(|q| q.source == QuestionSource::Excel));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].row, 4);
    assert_eq!(report.errors[0].field, "Correct Answer");
}
