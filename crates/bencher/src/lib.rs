//! Shared fixtures for the gateway benchmarks.

/// A browser navigation with only the headers every client sends.
pub const GET_SMALL: Fixture = Fixture::new(
    "get_small",
    FixtureGroup::Small,
    "GET /thread/42 HTTP/1.1\r\nHost: forum.example.com\r\nAccept: */*\r\n\r\n",
);

/// An asset fetch carrying the headers a real browser session accumulates.
pub const GET_LARGE: Fixture = Fixture::new(
    "get_large",
    FixtureGroup::Normal,
    concat!(
        "GET /assets/index-5c1a8e.js HTTP/1.1\r\n",
        "Host: forum.example.com\r\n",
        "Connection: keep-alive\r\n",
        "sec-ch-ua: \"Chromium\";v=\"128\", \"Not;A=Brand\";v=\"24\", \"Google Chrome\";v=\"128\"\r\n",
        "sec-ch-ua-mobile: ?0\r\n",
        "sec-ch-ua-platform: \"Linux\"\r\n",
        "User-Agent: Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36\r\n",
        "Accept: */*\r\n",
        "Sec-Fetch-Site: same-origin\r\n",
        "Sec-Fetch-Mode: no-cors\r\n",
        "Sec-Fetch-Dest: script\r\n",
        "Referer: https://forum.example.com/thread/42\r\n",
        "Accept-Encoding: gzip, deflate, br, zstd\r\n",
        "Accept-Language: en-US,en;q=0.9,de;q=0.8\r\n",
        "Cookie: session=3f9a0c7d2b1e4f58a6c9d0e1f2a3b4c5; theme=dark; locale=en\r\n",
        "If-Modified-Since: Wed, 21 Oct 2015 07:28:00 GMT\r\n",
        "\r\n",
    ),
);

/// A chunked API call as a client would upload a post.
pub const POST_CHUNKED: Fixture = Fixture::new(
    "post_chunked",
    FixtureGroup::Normal,
    concat!(
        "POST /api/posts HTTP/1.1\r\n",
        "Host: forum.example.com\r\n",
        "Content-Type: application/json\r\n",
        "Transfer-Encoding: chunked\r\n",
        "\r\n",
        "1b\r\n{\"thread\":42,\"body\":\"hello \r\n",
        "7\r\nforum\"}\r\n",
        "0\r\n\r\n",
    ),
);

/// An object storage answer relayed through the gateway.
pub const UPSTREAM_OK: Fixture = Fixture::new(
    "upstream_ok",
    FixtureGroup::Normal,
    concat!(
        "HTTP/1.1 200 OK\r\n",
        "Server: MinIO\r\n",
        "Content-Type: image/png\r\n",
        "Content-Length: 16\r\n",
        "ETag: \"d41d8cd98f00b204e9800998ecf8427e\"\r\n",
        "Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT\r\n",
        "Accept-Ranges: bytes\r\n",
        "\r\n",
        "0123456789abcdef",
    ),
);

/// A search service answer without framing, finished by the upstream closing.
pub const UPSTREAM_UNTIL_CLOSE: Fixture = Fixture::new(
    "upstream_until_close",
    FixtureGroup::Small,
    "HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"hits\":[],\"query\":\"rust\"}",
);

pub const REQUESTS: [Fixture; 3] = [GET_SMALL, GET_LARGE, POST_CHUNKED];

pub const RESPONSES: [Fixture; 2] = [UPSTREAM_OK, UPSTREAM_UNTIL_CLOSE];

#[derive(Debug, Copy, Clone)]
pub struct Fixture {
    name: &'static str,
    group: FixtureGroup,
    content: &'static str,
}

impl Fixture {
    pub const fn new(name: &'static str, group: FixtureGroup, content: &'static str) -> Self {
        Self { name, group, content }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> FixtureGroup {
        self.group
    }

    pub fn content(&self) -> &'static str {
        self.content
    }
}

#[derive(Clone, Copy, Debug)]
pub enum FixtureGroup {
    Small,
    Normal,
}
