//! Seed data so the builder is usable without external config or a remote server.

use crate::config::{ChapterCfg, DataFileCfg};
use crate::domain::{DataFileRequest, ReadingData, ReadingNode};

/// Built-in data files.
pub fn seed_datafiles() -> Vec<DataFileRequest> {
  vec![
    DataFileCfg {
      name: "weather".into(),
      filename: "weather.csv".into(),
      content: "city,temp\nBoston,12\nChicago,9\nDenver,15\n".into(),
      file_type: None,
      is_editable: false,
      rows: None,
      cols: None,
    }
    .to_request(),
    DataFileCfg {
      name: "notes".into(),
      filename: "notes.txt".into(),
      content: "Edit me, then read me from your program.\n".into(),
      file_type: None,
      is_editable: true,
      rows: Some(5),
      cols: Some(60),
    }
    .to_request(),
  ]
}

/// Built-in readings bank: one chapter with two sections.
pub fn seed_readings() -> Vec<ReadingNode> {
  vec![ReadingNode {
    key: "GeneralIntro".into(),
    data: Some(ReadingData {
      title: "General Introduction".into(),
      chapter: "GeneralIntro".into(),
      ..Default::default()
    }),
    children: vec![
      leaf(1, "GeneralIntro", "ThisBook", "This Book", 1, 2),
      leaf(2, "GeneralIntro", "Algorithms", "Algorithms", 2, 5),
    ],
  }]
}

fn leaf(id: u64, chapter: &str, subchapter: &str, title: &str, num: u32, num_questions: u32) -> ReadingNode {
  ReadingNode {
    key: subchapter.into(),
    data: Some(ReadingData {
      id,
      title: title.into(),
      chapter: chapter.into(),
      subchapter: subchapter.into(),
      num,
      num_questions,
    }),
    children: Vec::new(),
  }
}

/// Readings tree from the TOML bank.
pub fn readings_from_config(chapters: &[ChapterCfg]) -> Vec<ReadingNode> {
  chapters
    .iter()
    .map(|c| ReadingNode {
      key: c.chapter.clone(),
      data: Some(ReadingData {
        title: c.title.clone(),
        chapter: c.chapter.clone(),
        ..Default::default()
      }),
      children: c
        .subchapters
        .iter()
        .map(|s| leaf(s.id, &c.chapter, &s.subchapter, &s.title, s.num, s.num_questions))
        .collect(),
    })
    .collect()
}
