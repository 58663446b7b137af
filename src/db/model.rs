use sqlx::FromRow;

/// 端侧轻量特征类型定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    /// 文图共享空间的图像嵌入，文本搜索用
    Clip,
    /// 图像相似空间的嵌入，以图搜图用
    Image,
    /// 人脸身份嵌入，一张图可有多条记录
    Face,
}

impl FeatureType {
    pub const ALL: [FeatureType; 3] = [FeatureType::Clip, FeatureType::Image, FeatureType::Face];

    pub fn code(self) -> i64 {
        match self {
            Self::Clip => 1,
            Self::Image => 2,
            Self::Face => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Clip),
            2 => Some(Self::Image),
            3 => Some(Self::Face),
            _ => None,
        }
    }

    /// 索引文件的基础名
    pub fn index_name(self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::Image => "image",
            Self::Face => "face",
        }
    }

    /// 一个资产是否可以产生多条该类型的记录
    pub fn multi_instance(self) -> bool {
        matches!(self, Self::Face)
    }
}

/// 稀疏特征记录，主键为 (media_key, feat_type, sub_index)
#[derive(Debug, Clone, FromRow)]
pub struct FeatureRecord {
    pub media_key: String,
    pub feat_type: i64,
    /// 非人脸特征恒为 0；人脸特征为人脸序号
    pub sub_index: i64,
    /// 小端 float32 向量
    pub vector: Vec<u8>,
    pub updated_at: i64,
}

/// 分类记录，一张图片可以有多个标签
#[derive(Debug, Clone, FromRow)]
pub struct CategoryRecord {
    pub media_key: String,
    pub label: String,
    pub score: f64,
    pub updated_at: i64,
}
