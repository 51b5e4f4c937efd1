pub fn is_elevated() -> bool {
    false
}
