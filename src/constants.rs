/// 默认掌握阈值（score >= 该值视为 Mastered）
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.7;

/// 默认学习率（EMA alpha）
pub const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// score <= 该值时状态为 Review
pub const REVIEW_SCORE_CEILING: f64 = 0.3;

/// 子技能答错时对直接前置技能的扣分
pub const DEFAULT_PARENT_PENALTY: f64 = 0.15;

/// 每日遗忘衰减率
pub const DEFAULT_DECAY_RATE: f64 = 0.1;

/// 诊断测试中按章节授予的临时分数
pub const DIAGNOSTIC_GRANT_SCORE: f64 = 0.8;

/// 探索阶段的题目数
pub const EXPLORATION_TURNS: usize = 5;

/// 稳定性提前结束：最少作答数
pub const STABILITY_MIN_ATTEMPTS: usize = 15;

/// 稳定性提前结束：观察窗口
pub const STABILITY_WINDOW: usize = 5;

/// 兜底阶段最多抽样的技能数
pub const MAX_FALLBACK_SKILLS: usize = 5;

/// 复习推荐默认返回数量
pub const DEFAULT_REVIEW_LIMIT: usize = 3;
