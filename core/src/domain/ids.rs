use chrono::Utc;
use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Client-side id: `{unix millis}-{9 base36 chars}`.
///
/// Ids double as idempotency keys for local application and remote upserts.
pub fn generate_id() -> String {
	let mut rng = rand::thread_rng();

	let suffix = (0..SUFFIX_LEN)
		.map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
		.collect::<String>();

	format!("{}-{suffix}", Utc::now().timestamp_millis())
}
