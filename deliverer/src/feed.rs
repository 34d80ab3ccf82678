use chrono::{DateTime, Utc};

/// Escapes the five XML-special characters in text content.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }

    escaped
}

#[derive(Debug, Clone)]
pub struct FeedChannel {
    pub title: String,
    pub description: String,
    pub link: String,
    pub language: String,
    pub self_url: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub enclosure_url: String,
    pub pub_date: DateTime<Utc>,
    pub duration_sec: i64,
    pub guid: String,
}

/// Renders the per-user syndication feed: an RSS 2.0 envelope with the
/// itunes and atom namespaces, one item per delivered digest, newest
/// first. Callers pass items already sorted by creation time descending.
pub fn render_feed(channel: &FeedChannel, items: &[FeedItem]) -> String {
    let mut xml = String::new();

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(
        "<rss version=\"2.0\" xmlns:itunes=\"http://www.itunes.com/dtds/podcast-1.0.dtd\" xmlns:atom=\"http://www.w3.org/2005/Atom\">\n",
    );
    xml.push_str("  <channel>\n");
    xml.push_str(&format!(
        "    <title>{}</title>\n",
        escape_xml(&channel.title)
    ));
    xml.push_str(&format!(
        "    <description>{}</description>\n",
        escape_xml(&channel.description)
    ));
    xml.push_str(&format!("    <link>{}</link>\n", escape_xml(&channel.link)));
    xml.push_str(&format!(
        "    <language>{}</language>\n",
        escape_xml(&channel.language)
    ));
    xml.push_str(&format!(
        "    <atom:link href=\"{}\" rel=\"self\" type=\"application/rss+xml\"/>\n",
        escape_xml(&channel.self_url)
    ));
    xml.push_str(&format!(
        "    <itunes:author>{}</itunes:author>\n",
        escape_xml(&channel.author)
    ));
    xml.push_str(&format!(
        "    <itunes:summary>{}</itunes:summary>\n",
        escape_xml(&channel.description)
    ));

    for item in items {
        xml.push_str("    <item>\n");
        xml.push_str(&format!(
            "      <title>{}</title>\n",
            escape_xml(&item.title)
        ));
        xml.push_str(&format!(
            "      <description>{}</description>\n",
            escape_xml(&item.description)
        ));
        xml.push_str(&format!(
            "      <enclosure url=\"{}\" type=\"audio/mpeg\" length=\"0\"/>\n",
            escape_xml(&item.enclosure_url)
        ));
        xml.push_str(&format!(
            "      <guid isPermaLink=\"false\">{}</guid>\n",
            escape_xml(&item.guid)
        ));
        xml.push_str(&format!(
            "      <pubDate>{}</pubDate>\n",
            item.pub_date.to_rfc2822()
        ));
        xml.push_str(&format!(
            "      <itunes:duration>{}</itunes:duration>\n",
            types::format_hms(item.duration_sec)
        ));
        xml.push_str("    </item>\n");
    }

    xml.push_str("  </channel>\n");
    xml.push_str("</rss>\n");

    xml
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn unescape_xml(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

    #[test]
    fn escape_covers_the_five_characters_and_round_trips() {
        let raw = r#"Tom & Jerry's <"show">"#;
        let escaped = escape_xml(raw);

        assert_eq!(
            escaped,
            "Tom &amp; Jerry&apos;s &lt;&quot;show&quot;&gt;"
        );
        assert_eq!(unescape_xml(&escaped), raw);
    }

    #[test]
    fn renders_the_bit_level_feed_contract() {
        let channel = FeedChannel {
            title: "Your Weekly Digest".to_string(),
            description: "Personalized podcast highlights".to_string(),
            link: "https://cdn.example.com/feeds/u1/feed.xml".to_string(),
            language: "en-us".to_string(),
            self_url: "https://cdn.example.com/feeds/u1/feed.xml".to_string(),
            author: "PodDigest".to_string(),
        };

        let items = vec![FeedItem {
            title: "Digest for week of Jul 27".to_string(),
            description: "5 clips from your shows".to_string(),
            enclosure_url: "https://cdn.example.com/digests/d1/digest.mp3".to_string(),
            pub_date: DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            duration_sec: 1723,
            guid: "3e9f0a50-0000-0000-0000-000000000001".to_string(),
        }];

        let xml = render_feed(&channel, &items);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("xmlns:itunes=\"http://www.itunes.com/dtds/podcast-1.0.dtd\""));
        assert!(xml.contains("xmlns:atom=\"http://www.w3.org/2005/Atom\""));
        assert!(xml.contains(
            "<atom:link href=\"https://cdn.example.com/feeds/u1/feed.xml\" rel=\"self\" type=\"application/rss+xml\"/>"
        ));
        assert!(xml.contains(
            "<enclosure url=\"https://cdn.example.com/digests/d1/digest.mp3\" type=\"audio/mpeg\" length=\"0\"/>"
        ));
        assert!(xml.contains(
            "<guid isPermaLink=\"false\">3e9f0a50-0000-0000-0000-000000000001</guid>"
        ));
        assert!(xml.contains("<pubDate>Sat, 1 Aug 2026 12:00:00 +0000</pubDate>"));
        assert!(xml.contains("<itunes:duration>0:28:43</itunes:duration>"));
    }

    #[test]
    fn item_text_is_escaped() {
        let channel = FeedChannel {
            title: "T".to_string(),
            description: "D".to_string(),
            link: "L".to_string(),
            language: "en-us".to_string(),
            self_url: "S".to_string(),
            author: "A".to_string(),
        };

        let items = vec![FeedItem {
            title: "Laurel & Hardy <live>".to_string(),
            description: String::new(),
            enclosure_url: "https://cdn/x.mp3?a=1&b=2".to_string(),
            pub_date: Utc::now(),
            duration_sec: 60,
            guid: "g".to_string(),
        }];

        let xml = render_feed(&channel, &items);
        assert!(xml.contains("<title>Laurel &amp; Hardy &lt;live&gt;</title>"));
        assert!(xml.contains("url=\"https://cdn/x.mp3?a=1&amp;b=2\""));
    }
}
