use std::path::Path;

use clap::ValueEnum;
use sha2::{Digest, Sha256};

/// 图片去重使用的哈希算法
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentHash {
    #[default]
    Sha256,
    Blake3,
}

impl ContentHash {
    /// 计算字节的十六进制摘要
    pub fn hex_digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => format!("{:x}", Sha256::digest(data)),
            Self::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// 记录在向量表目录中的名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::from_str(name, true).ok()
    }
}

/// 根据图片内容生成存储地址 `<namespace>/<digest><.ext>`
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    namespace: String,
    hash: ContentHash,
}

impl ContentAddresser {
    pub fn new(namespace: impl Into<String>, hash: ContentHash) -> Self {
        let namespace = namespace.into().trim_matches('/').to_string();
        Self { namespace, hash }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// 同样的字节总是得到同样的地址，与文件名和上传时间无关（扩展名除外）
    pub fn address(&self, data: &[u8], file_name: &str) -> String {
        let digest = self.hash.hex_digest(data);
        let ext = extension(file_name);
        if self.namespace.is_empty() {
            format!("{digest}{ext}")
        } else {
            format!("{}/{digest}{ext}", self.namespace)
        }
    }
}

/// 取出文件名中的扩展名（带点），只接受字母和数字组成的扩展名
fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        let addr = ContentAddresser::new("images", ContentHash::Sha256);
        assert_eq!(
            addr.address(b"", "a.jpg"),
            "images/e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.jpg"
        );
    }

    #[test]
    fn same_bytes_different_names() {
        let addr = ContentAddresser::new("images", ContentHash::Sha256);
        let a = addr.address(b"hello", "cat.png");
        let b = addr.address(b"hello", "uploads/dog.png");
        assert_eq!(a, b);
        assert_ne!(a, addr.address(b"hellp", "cat.png"));
    }

    #[test]
    fn blake3_digest_length() {
        let addr = ContentAddresser::new("/images/", ContentHash::Blake3);
        let id = addr.address(&[1, 2, 3], "x.webp");
        assert!(id.starts_with("images/"));
        assert!(id.ends_with(".webp"));
        assert_eq!(id.len(), "images/".len() + 64 + ".webp".len());
    }

    #[test]
    fn hash_names() {
        for hash in [ContentHash::Sha256, ContentHash::Blake3] {
            assert_eq!(ContentHash::parse(hash.name()), Some(hash));
        }
        assert_eq!(ContentHash::parse("md5"), None);
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension("photo.JPG"), ".JPG");
        assert_eq!(extension("archive.tar.gz"), ".gz");
        assert_eq!(extension("noext"), "");
        assert_eq!(extension(".hidden"), "");
        assert_eq!(extension("weird.j p"), "");
        assert_eq!(extension(""), "");
    }
}
