pub trait AssetStore {
    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, String>;
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String>;
}
