pub fn string(_name: &str) -> Option<String> {
    None
}

pub fn number(_name: &str) -> Option<u64> {
    None
}
