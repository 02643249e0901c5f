use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\p{L}[\p{L}\p{N}]*(?:['-][\p{L}\p{N}]+)*").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let english: &[&str] = &[
            "i","me","my","myself","we","our","ours","ourselves","you","you're","you've","you'll","you'd",
            "your","yours","yourself","yourselves","he","him","his","himself","she","she's","her","hers",
            "herself","it","it's","its","itself","they","them","their","theirs","themselves",
            "what","which","who","whom","this","that","that'll","these","those",
            "am","is","are","was","were","be","been","being","have","has","had","having","do","does","did","doing",
            "a","an","the","and","but","if","or","because","as","until","while","of","at","by","for","with",
            "about","against","between","into","through","during","before","after","above","below",
            "to","from","up","down","in","out","on","off","over","under","again","further","then","once",
            "here","there","when","where","why","how","all","any","both","each","few","more","most","other",
            "some","such","no","nor","not","only","own","same","so","than","too","very",
            "s","t","can","will","just","don","don't","should","should've","now","d","ll","m","o","re","ve","y",
            "ain","aren","aren't","couldn","couldn't","didn","didn't","doesn","doesn't","hadn","hadn't",
            "hasn","hasn't","haven","haven't","isn","isn't","ma","mightn","mightn't","mustn","mustn't",
            "needn","needn't","shan","shan't","shouldn","shouldn't","wasn","wasn't","weren","weren't",
            "won","won't","wouldn","wouldn't",
        ];
        // Wikipedia boilerplate that carries no topical signal.
        let corpus: &[&str] = &[
            "category","references","also","external","links","may","first","see","history","people",
            "one","two","part","thumb","including","second","following","many","however","would","became",
        ];
        english.iter().chain(corpus.iter()).copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into terms using NFKC normalization, lowercasing and stopword removal.
///
/// The same function must be used for indexing and for queries; an empty result
/// means "no results", never "match everything".
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|token| !is_stopword(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Rock-n-roll isn't O'Neil's thing!");
        assert_eq!(t, vec!["rock-n-roll", "o'neil's", "thing"]);
    }

    #[test]
    fn corpus_boilerplate_is_dropped() {
        let t = tokenize("See also: External links, References, Category:Physics");
        assert_eq!(t, vec!["physics"]);
    }

    #[test]
    fn leading_digits_are_not_words() {
        assert_eq!(tokenize("1984 python3 42nd"), vec!["python3", "nd"]);
    }
}
