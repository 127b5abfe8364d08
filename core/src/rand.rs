/// ids used to correlate requests with their completion notifications,
/// 0 is never handed out so it can mean "no change"
pub fn generate_id() -> u32 {
    loop {
        let id: u32 = rand::random();
        if id != 0 {
            return id;
        }
    }
}
