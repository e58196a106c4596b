/// Splits text into roughly `chunk_size`-character pieces on paragraph
/// boundaries where possible, falling back to a hard cut when a single
/// paragraph exceeds the chunk size. Used for hierarchical summarization
/// (spec §4.4, §9 "coroutine fan-out").
pub fn split_into_chunks(text: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if current.len() + paragraph.len() + 2 > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if paragraph.len() > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            for hard_chunk in paragraph.as_bytes().chunks(chunk_size) {
                chunks.push(String::from_utf8_lossy(hard_chunk).into_owned());
            }
            continue;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn merge_chunk_summaries(summaries: &[String]) -> String {
    summaries.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_paragraph_boundaries() {
        let text = "a".repeat(100) + "\n\n" + &"b".repeat(100) + "\n\n" + &"c".repeat(100);
        let chunks = split_into_chunks(&text, 150);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn single_short_text_is_one_chunk() {
        let chunks = split_into_chunks("hello world", 1000);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }
}
