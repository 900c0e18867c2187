//! ConvoKit-shaped corpus export with VADER sentiment labels.

use crate::infrastructure::entities::{Conversation, Speaker, Utterance};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::io;
use tar::{Builder, Header};
use vader_sentiment::SentimentIntensityAnalyzer;

const POSITIVE_THRESHOLD: f64 = 0.05;
const NEGATIVE_THRESHOLD: f64 = -0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn from_compound(compound: f64) -> Sentiment {
        if compound >= POSITIVE_THRESHOLD {
            Sentiment::Positive
        } else if compound <= NEGATIVE_THRESHOLD {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

/// VADER polarity; the lexicons are loaded once per process by the library.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentimentAnalyzer;

impl SentimentAnalyzer {
    pub fn classify(&self, text: &str) -> Sentiment {
        let analyzer = SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(text);
        Sentiment::from_compound(scores.get("compound").copied().unwrap_or(0.0))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Corpus {
    pub speakers: Vec<CorpusSpeaker>,
    pub conversations: Vec<CorpusConversation>,
    pub utterances: Vec<CorpusUtterance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusSpeaker {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusConversation {
    pub id: String,
    pub utterances: Vec<String>,
    pub meta: ConversationMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationMeta {
    pub bot_name: String,
    pub participant_id: String,
    pub study_name: Option<String>,
    pub user_group: Option<String>,
    pub survey_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusUtterance {
    pub id: String,
    pub speaker: String,
    pub text: String,
    pub conversation_id: String,
    pub reply_to: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    pub meta: UtteranceMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtteranceMeta {
    pub sentiment: Sentiment,
    pub intent: &'static str,
    pub topic: &'static str,
}

/// Speakers are identified by participant id or bot name.
fn speaker_of(conversation: &Conversation, utterance: &Utterance) -> String {
    utterance
        .participant_id
        .clone()
        .or_else(|| utterance.bot_name.clone())
        .unwrap_or_else(|| match utterance.speaker_id {
            Speaker::User => conversation.participant_id.clone(),
            Speaker::Assistant => conversation.bot_name.clone(),
        })
}

pub fn build_corpus(
    analyzer: &SentimentAnalyzer,
    conversation: &Conversation,
    utterances: &[Utterance],
) -> Corpus {
    let mut corpus_utterances: Vec<CorpusUtterance> = Vec::with_capacity(utterances.len());

    for utterance in utterances {
        let reply_to = corpus_utterances.last().map(|previous| previous.id.clone());
        corpus_utterances.push(CorpusUtterance {
            id: utterance.id.to_string(),
            speaker: speaker_of(conversation, utterance),
            text: utterance.text.clone(),
            conversation_id: conversation.conversation_id.clone(),
            reply_to,
            timestamp: utterance.created_time.timestamp(),
            meta: UtteranceMeta {
                sentiment: analyzer.classify(&utterance.text),
                intent: "general",
                topic: "chat",
            },
        });
    }

    let speakers: BTreeSet<String> = corpus_utterances
        .iter()
        .map(|u| u.speaker.clone())
        .collect();

    Corpus {
        speakers: speakers
            .into_iter()
            .map(|id| CorpusSpeaker { id })
            .collect(),
        conversations: vec![CorpusConversation {
            id: conversation.conversation_id.clone(),
            utterances: corpus_utterances.iter().map(|u| u.id.clone()).collect(),
            meta: ConversationMeta {
                bot_name: conversation.bot_name.clone(),
                participant_id: conversation.participant_id.clone(),
                study_name: conversation.study_name.clone(),
                user_group: conversation.user_group.clone(),
                survey_id: conversation.survey_id.clone(),
            },
        }],
        utterances: corpus_utterances,
    }
}

const STR_TYPE: &str = "<class 'str'>";

fn to_json<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(io::Error::other)
}

/// The files ConvoKit's `Corpus.dump` writes, keyed by file name.
fn dump_files(corpus: &Corpus) -> io::Result<Vec<(&'static str, Vec<u8>)>> {
    let mut utterances = Vec::new();
    for utterance in &corpus.utterances {
        utterances.extend(to_json(&json!({
            "id": utterance.id,
            "speaker": utterance.speaker,
            "conversation_id": utterance.conversation_id,
            "reply_to": utterance.reply_to,
            "timestamp": utterance.timestamp,
            "text": utterance.text,
            "vectors": [],
            "meta": utterance.meta,
        }))?);
        utterances.push(b'\n');
    }

    let speakers: Map<String, Value> = corpus
        .speakers
        .iter()
        .map(|speaker| (speaker.id.clone(), json!({"vectors": [], "meta": {}})))
        .collect();

    let conversations: Map<String, Value> = corpus
        .conversations
        .iter()
        .map(|conversation| {
            (
                conversation.id.clone(),
                json!({"vectors": [], "meta": conversation.meta}),
            )
        })
        .collect();

    let index = json!({
        "utterances-index": {
            "sentiment": [STR_TYPE],
            "intent": [STR_TYPE],
            "topic": [STR_TYPE],
        },
        "speakers-index": {},
        "conversations-index": {
            "bot_name": [STR_TYPE],
            "participant_id": [STR_TYPE],
            "study_name": [STR_TYPE],
            "user_group": [STR_TYPE],
            "survey_id": [STR_TYPE],
        },
        "overall-index": {},
        "version": 1,
        "vectors": [],
    });

    Ok(vec![
        ("corpus.json", to_json(&json!({}))?),
        ("conversations.json", to_json(&conversations)?),
        ("index.json", to_json(&index)?),
        ("speakers.json", to_json(&speakers)?),
        ("utterances.jsonl", utterances),
    ])
}

/// Packs the corpus dump into a gzipped tarball under the directory `name`.
pub fn archive(corpus: &Corpus, name: &str) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = Builder::new(encoder);

    for (file_name, contents) in dump_files(corpus)? {
        let mut header = Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, format!("{name}/{file_name}"), contents.as_slice())?;
    }

    tar.into_inner()?.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::entities::ModelVendor;
    use chrono::Utc;
    use flate2::read::GzDecoder;
    use std::collections::HashMap;
    use std::io::Read;

    fn conversation() -> Conversation {
        Conversation {
            conversation_id: "c1".into(),
            bot_name: "helper".into(),
            participant_id: "p1".into(),
            initial_utterance: None,
            study_name: Some("study1".into()),
            user_group: None,
            survey_id: None,
            survey_meta_data: None,
            bot_prompt: String::new(),
            model_type: ModelVendor::OpenAI,
            model_id: "gpt-4o-mini".into(),
            started_time: Utc::now(),
        }
    }

    fn utterance(id: i64, speaker: Speaker, text: &str) -> Utterance {
        Utterance {
            id,
            conversation_id: "c1".into(),
            speaker_id: speaker,
            bot_name: (speaker == Speaker::Assistant).then(|| "helper".to_string()),
            participant_id: (speaker == Speaker::User).then(|| "p1".to_string()),
            text: text.into(),
            audio_file: None,
            is_voice: false,
            created_time: Utc::now(),
        }
    }

    #[test]
    fn test_compound_thresholds() {
        assert_eq!(Sentiment::from_compound(0.05), Sentiment::Positive);
        assert_eq!(Sentiment::from_compound(0.049), Sentiment::Neutral);
        assert_eq!(Sentiment::from_compound(-0.049), Sentiment::Neutral);
        assert_eq!(Sentiment::from_compound(-0.05), Sentiment::Negative);
    }

    #[test]
    fn test_analyzer_labels_obvious_text() {
        let analyzer = SentimentAnalyzer::default();

        assert_eq!(analyzer.classify("I love this, it is wonderful!"), Sentiment::Positive);
        assert_eq!(analyzer.classify("This is terrible and I hate it."), Sentiment::Negative);
    }

    #[test]
    fn test_corpus_links_replies_and_speakers() {
        let utterances = [
            utterance(1, Speaker::Assistant, "Welcome!"),
            utterance(2, Speaker::User, "Hello"),
            utterance(3, Speaker::Assistant, "How can I help?"),
        ];

        let corpus = build_corpus(&SentimentAnalyzer::default(), &conversation(), &utterances);

        assert_eq!(corpus.utterances.len(), 3);
        assert_eq!(corpus.utterances[0].reply_to, None);
        assert_eq!(corpus.utterances[2].reply_to.as_deref(), Some("2"));
        assert_eq!(corpus.utterances[1].speaker, "p1");
        assert_eq!(corpus.speakers.len(), 2);
        assert_eq!(corpus.conversations[0].utterances, vec!["1", "2", "3"]);
        assert_eq!(corpus.conversations[0].meta.study_name.as_deref(), Some("study1"));
    }

    #[test]
    fn test_archive_contains_the_convokit_dump() {
        let utterances = [
            utterance(1, Speaker::Assistant, "Welcome!"),
            utterance(2, Speaker::User, "Hello"),
        ];
        let corpus = build_corpus(&SentimentAnalyzer, &conversation(), &utterances);

        let bytes = archive(&corpus, "c1").unwrap();

        let mut files = HashMap::new();
        let mut tar = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            files.insert(path, contents);
        }

        let mut names: Vec<&str> = files.keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "c1/conversations.json",
                "c1/corpus.json",
                "c1/index.json",
                "c1/speakers.json",
                "c1/utterances.jsonl",
            ]
        );

        let lines: Vec<Value> = files["c1/utterances.jsonl"]
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["reply_to"], "1");
        assert_eq!(lines[1]["speaker"], "p1");

        let speakers: Value = serde_json::from_str(&files["c1/speakers.json"]).unwrap();
        assert!(speakers.get("p1").is_some() && speakers.get("helper").is_some());
        let conversations: Value = serde_json::from_str(&files["c1/conversations.json"]).unwrap();
        assert_eq!(conversations["c1"]["meta"]["study_name"], "study1");
    }
}
