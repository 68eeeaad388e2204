pub async fn root() -> &'static str {
    "Hello! Welcome to the Videos API"
}
